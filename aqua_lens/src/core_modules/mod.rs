pub mod classifier;
pub mod color_profile;
pub mod edge_detector;
pub mod estimator;
pub mod features;
pub mod pixel;
pub mod raster;
pub mod region;
pub mod region_grower;
pub mod window;
