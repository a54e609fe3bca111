pub mod ssvi_calibrator;
pub mod ssvi_model;

pub use ssvi_calibrator::SsviCalibrator;
pub use ssvi_model::{phi, SsviParams, SsviSurface, NUM_MODEL_PARAMS};
