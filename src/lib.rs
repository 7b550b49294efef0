//! GridCut — split an image into a grid of sticker slices, edit each slice,
//! export the lot as a zip archive.

pub mod app;
pub mod assets;
pub mod channel;
pub mod cli;
pub mod crop;
pub mod editor;
pub mod export;
pub mod geometry;
pub mod logger;
pub mod raster;
pub mod services;
pub mod slices;
