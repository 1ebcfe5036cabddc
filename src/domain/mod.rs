// Domain layer: records exchanged between workflow steps and the ports the steps depend on.

pub mod model;
pub mod ports;
