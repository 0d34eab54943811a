//! Canned-reply client for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::error::Error as StdError;
use std::sync::Mutex;

use super::{ ChatClient, CompletionResponse, GenerationOptions };

#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<(String, GenerationOptions)>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
        let replies = replies
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn options(&self) -> Vec<GenerationOptions> {
        self.prompts.lock().unwrap().iter().map(|(_, o)| *o).collect()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        self.prompts.lock().unwrap().push((prompt.to_string(), *options));
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(CompletionResponse { response: text }),
            Some(Err(message)) => Err(message.into()),
            None => Err("script exhausted".into()),
        }
    }

    fn get_model(&self) -> String {
        "scripted".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}
