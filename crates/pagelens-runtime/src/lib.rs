pub mod bus;
pub mod request;
pub mod runtime;

pub use bus::{HostBus, HostEvent, ScreenshotCapture};
pub use request::{PageState, Request, Response};
pub use runtime::AssistantRuntime;
