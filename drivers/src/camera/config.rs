use crate::hal::camera::{DeviceId, PipelineDelay};

/// Default request pool size per context.
pub const CTX_REQ_MAX: usize = 20;

/// Static configuration of a camera context.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Name used in logs and device info.
    pub name: &'static str,
    /// Number of request slots, fixed for the context's lifetime.
    pub req_capacity: usize,
    pub dev_id: DeviceId,
    pub pipeline_delay: PipelineDelay,
}

impl ContextConfig {
    pub const fn new(name: &'static str, dev_id: DeviceId) -> Self {
        Self {
            name,
            req_capacity: CTX_REQ_MAX,
            dev_id,
            pipeline_delay: PipelineDelay::One,
        }
    }

    pub const fn with_capacity(mut self, req_capacity: usize) -> Self {
        self.req_capacity = req_capacity;
        self
    }

    pub const fn with_delay(mut self, pipeline_delay: PipelineDelay) -> Self {
        self.pipeline_delay = pipeline_delay;
        self
    }
}

impl Default for ContextConfig {
    /// Default configuration: an ISP front end with `CTX_REQ_MAX` slots.
    fn default() -> Self {
        Self::new("cam-ctx", DeviceId::Ife)
    }
}
