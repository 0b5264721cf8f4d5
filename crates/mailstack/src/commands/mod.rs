pub mod graph;
pub mod outputs;
pub mod plan;
pub mod unlock;
pub mod up;
pub mod validate;
