pub mod harness;
pub mod judge;
pub mod redact;
pub mod sandbox;

// Re-export the pieces callers wire together
pub use judge::Judge;
pub use sandbox::{
    DockerSandbox, RuntimeRegistry, RuntimeSpec, SandboxBackend, SandboxError, GRACE_SECS,
    MIN_MEMORY_MB,
};
