// Domain layer: pipeline result model and ports (storage, units).

pub mod model;
pub mod ports;
