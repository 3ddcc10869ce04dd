pub mod server;

use anyhow::Result;

/// Action to execute after CLI parsing.
#[derive(Debug)]
pub enum Action {
    Server(Box<server::Args>),
}

impl Action {
    /// Execute the action.
    ///
    /// # Errors
    /// Propagates the underlying action error.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Server(args) => server::execute(*args).await,
        }
    }
}
