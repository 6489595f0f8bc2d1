mod mistral;
mod provider;

pub use mistral::{DEFAULT_MISTRAL_MODEL, MISTRAL_PROVIDER_ID, MistralProvider};
pub use provider::{
    LlmProvider, ProviderConfig, ProviderError, ProviderEventStream, ProviderResult,
    ProviderStreamHandle, ProviderWorker, StreamEventPayload, StreamRequest, make_event_stream,
};
