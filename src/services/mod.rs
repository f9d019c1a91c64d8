pub mod form_injector;
pub mod page_host;
pub mod page_inspector;

pub use form_injector::{CdpFormInjector, FormInjector};
pub use page_host::{CdpPageHost, PageHost};
pub use page_inspector::{CdpPageInspector, EmbeddedArtifact, PageInspector};
