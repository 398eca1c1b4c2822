pub mod analysis;
pub mod config;
mod endpoint;
mod error;
pub mod model;
pub mod utils;

mod mesh;
mod poll;
mod types;
mod vision;

pub use analysis::{
    AnalysisFields, AnalysisResult, analysis_from_payload, analysis_from_text, coerce_list,
    extract_json_from_text, normalize_analysis,
};
pub use config::{DEFAULT_MESH_BASES, DEFAULT_VISION_BASE_URL, Env, MeshConfig, VisionConfig};
pub use endpoint::EndpointCandidates;
pub use error::{Result, VitaError};
pub use mesh::{MeshClient, TaskService};
pub use model::ModelVariant;
pub use poll::{POLL_INTERVAL, TaskSlot, TaskSnapshot, WatchState};
pub use types::{
    AnalysisRequest, GenerationTask, ImageTaskRequest, TaskSource, TaskStatus, TextTaskRequest,
};
pub use vision::VisionClient;
