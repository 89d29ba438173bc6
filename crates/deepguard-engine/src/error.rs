use deepguard_core::ids::ElementId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("element not registered: {0}")]
    ElementNotFound(ElementId),
}
