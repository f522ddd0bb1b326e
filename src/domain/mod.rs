// Domain layer: core models and ports (interfaces). Hardware and filesystem access live in adapters.

pub mod model;
pub mod ports;
