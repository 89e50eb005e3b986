use std::collections::BTreeMap;

use bolt_core::sync::PreviewMetadata;
use bolt_core::sync::PreviewSnapshot;
use bolt_core::GenerationRequest;

/// Produces a raw response for a generation request.
///
/// Implementations block until the whole response is available.
pub trait GenerationService: Send + Sync {
    fn name(&self) -> &'static str;
    fn generate(&self, request: &GenerationRequest) -> std::io::Result<String>;
}

/// Boots an interactive preview from a full file map.
pub trait PreviewRuntime {
    type Handle: PreviewHandle;

    fn bootstrap(
        &mut self,
        files: &BTreeMap<String, String>,
        template_id: &str,
        metadata: &PreviewMetadata,
    ) -> std::io::Result<Self::Handle>;
}

pub trait PreviewHandle {
    fn materialize(
        &mut self,
        create: &BTreeMap<String, String>,
        destroy: &[String],
    ) -> std::io::Result<()>;
    fn snapshot(&self) -> std::io::Result<PreviewSnapshot>;
}
