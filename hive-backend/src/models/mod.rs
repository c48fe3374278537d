pub mod audit;
pub mod intelligence;
pub mod mission;
pub mod schedule;
pub mod workspace;
