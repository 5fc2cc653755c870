//! Vector preparation: filtering, merging, differencing and buffering of
//! polygon and line layers, plus the hydrography and national sequences
//! built from them

pub mod hydrology;
pub mod national;
pub mod prepare;

pub use hydrology::{ChannelAreaInputs, HydrologyLayers, WatershedSelector};
pub use national::TransportLayer;
pub use prepare::{present, FeatureFilter, VectorPreparationStage};
