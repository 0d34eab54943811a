pub mod api;
pub mod websocket;

use crate::agent::ReasoningAgent;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    agent: Arc<ReasoningAgent>,
    http_port: Option<u16>,
}

impl Server {
    pub fn new(addr: String, agent: Arc<ReasoningAgent>, http_port: Option<u16>) -> Self {
        Self {
            addr,
            agent,
            http_port,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(http_port) = self.http_port {
            api::start_http_server(http_port, self.agent.clone()).await?;
        }

        websocket::start_ws_server(&self.addr, self.agent.clone()).await
    }
}
