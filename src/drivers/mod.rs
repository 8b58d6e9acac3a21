pub mod filter;
pub mod history;
pub mod kalman;
pub mod math;
pub mod motor_data;
pub mod traction;
