// Marker tracking core — stability detection and trigger coordination.

pub mod stability;
pub mod trigger;
