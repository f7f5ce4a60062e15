use std::sync::Arc;

use crate::gateway::{ReplySender, SignatureVerifier};
use crate::handler::MessageHandler;

/// Shared by every webhook request.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<MessageHandler>,
    pub sender: Arc<dyn ReplySender>,
    pub verifier: Arc<dyn SignatureVerifier>,
}

impl AppState {
    pub fn new(
        handler: MessageHandler,
        sender: Arc<dyn ReplySender>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            sender,
            verifier,
        }
    }
}
