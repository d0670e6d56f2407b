pub mod conflicts;
pub mod debug;
pub mod graph;
pub mod intervals;
pub mod parser;
pub mod problem;
pub mod scheduling;
pub mod solvers;
