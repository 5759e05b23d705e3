use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::llm::TextGenerator;
use crate::places::{Place, MAX_PLACES};

pub const NOT_FOUND_TEXT: &str = "🥲 附近沒有找到合適的地點，再換個指令試試看吧！";
pub const NO_DATA_TEXT: &str = "🥲 目前沒有附近店家的資料，可以換個指令試試看！";

const UNKNOWN_NAME: &str = "未知店家";
const UNKNOWN_ADDRESS: &str = "未知地址";

/// Turns search results into the reply text
#[async_trait]
pub trait ReplyFormatter: Send + Sync {
    /// `category` is the search keyword the places were found with.
    async fn format(&self, places: &[Place], category: &str) -> String;
}

/// Lists each place with its address and a map link
pub struct DirectFormatter;

impl DirectFormatter {
    pub fn render(places: &[Place]) -> String {
        if places.is_empty() {
            return NOT_FOUND_TEXT.to_string();
        }

        places
            .iter()
            .take(MAX_PLACES)
            .map(|p| {
                format!(
                    "📍 {}\n🏠 {}\n🔗 {}",
                    p.name.as_deref().unwrap_or(UNKNOWN_NAME),
                    p.address.as_deref().unwrap_or(UNKNOWN_ADDRESS),
                    p.map_url()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
impl ReplyFormatter for DirectFormatter {
    async fn format(&self, places: &[Place], _category: &str) -> String {
        Self::render(places)
    }
}

/// Asks the text-generation API to recommend one or two of the places
pub struct DelegatedFormatter {
    generator: Arc<dyn TextGenerator>,
    language: String,
}

impl DelegatedFormatter {
    pub fn new(generator: Arc<dyn TextGenerator>, language: impl Into<String>) -> Self {
        Self {
            generator,
            language: language.into(),
        }
    }

    pub fn build_prompt(&self, places: &[Place], category: &str) -> String {
        let listing = places
            .iter()
            .take(MAX_PLACES)
            .enumerate()
            .map(|(i, p)| {
                format!(
                    "{}. {}（{}）",
                    i + 1,
                    p.name.as_deref().unwrap_or(UNKNOWN_NAME),
                    p.address.as_deref().unwrap_or(UNKNOWN_ADDRESS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "以下是使用者附近的「{category}」店家：\n{listing}\n\n\
             請從中推薦一到兩家，並簡短說明推薦的理由。請使用{}回答。",
            self.language
        )
    }
}

#[async_trait]
impl ReplyFormatter for DelegatedFormatter {
    async fn format(&self, places: &[Place], category: &str) -> String {
        if places.is_empty() {
            return NO_DATA_TEXT.to_string();
        }

        let prompt = self.build_prompt(places, category);
        match self.generator.generate(&prompt).await {
            Ok(text) => {
                info!("Generated recommendation ({} chars)", text.chars().count());
                text
            }
            Err(e) => {
                // Error detail stays in the log; the user still gets the plain listing
                error!("Text generation failed, falling back to direct listing: {:#}", e);
                DirectFormatter::render(places)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedGenerator {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedGenerator {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn places(n: usize) -> Vec<Place> {
        (0..n)
            .map(|i| {
                let name = format!("店家{}", i + 1);
                let address = format!("地址{}", i + 1);
                Place::new(Some(&name), Some(&address), 24.0 + i as f64, 121.0 + i as f64)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_direct_empty_is_not_found() {
        for category in ["甜點", "飲料", ""] {
            assert_eq!(DirectFormatter.format(&[], category).await, NOT_FOUND_TEXT);
        }
    }

    #[tokio::test]
    async fn test_direct_blocks_joined_by_blank_line() {
        let text = DirectFormatter.format(&places(2), "甜點").await;
        assert_eq!(
            text,
            "📍 店家1\n🏠 地址1\n🔗 https://www.google.com/maps?q=24,121\n\n\
             📍 店家2\n🏠 地址2\n🔗 https://www.google.com/maps?q=25,122"
        );
    }

    #[tokio::test]
    async fn test_direct_uses_only_first_three() {
        let text = DirectFormatter.format(&places(5), "小吃").await;
        assert_eq!(text.split("\n\n").count(), 3);
        assert!(text.contains("店家3"));
        assert!(!text.contains("店家4"));
    }

    #[tokio::test]
    async fn test_direct_fills_in_missing_fields() {
        let text = DirectFormatter
            .format(&[Place::new(None, None, 1.5, 2.5)], "飲料")
            .await;
        assert_eq!(
            text,
            "📍 未知店家\n🏠 未知地址\n🔗 https://www.google.com/maps?q=1.5,2.5"
        );
    }

    #[tokio::test]
    async fn test_delegated_returns_generated_text_verbatim() {
        let generator = FixedGenerator::ok("推薦店家1，因為很好吃！");
        let formatter = DelegatedFormatter::new(generator.clone(), "繁體中文");

        let text = formatter.format(&places(3), "小吃").await;
        assert_eq!(text, "推薦店家1，因為很好吃！");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("「小吃」"));
        assert!(prompts[0].contains("1. 店家1（地址1）\n2. 店家2（地址2）\n3. 店家3（地址3）"));
        assert!(prompts[0].contains("繁體中文"));
    }

    #[tokio::test]
    async fn test_delegated_prompt_lists_at_most_three() {
        let formatter = DelegatedFormatter::new(FixedGenerator::ok("ok"), "繁體中文");
        let prompt = formatter.build_prompt(&places(4), "甜點");
        assert!(prompt.contains("3. 店家3"));
        assert!(!prompt.contains("店家4"));
    }

    #[tokio::test]
    async fn test_delegated_empty_skips_generation() {
        let generator = FixedGenerator::ok("should not be used");
        let formatter = DelegatedFormatter::new(generator.clone(), "繁體中文");

        assert_eq!(formatter.format(&[], "飲料").await, NO_DATA_TEXT);
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delegated_failure_hides_error_detail() {
        let formatter =
            DelegatedFormatter::new(FixedGenerator::failing("401 invalid api key sk-xxx"), "繁體中文");

        let text = formatter.format(&places(2), "甜點").await;
        assert!(!text.contains("sk-xxx"));
        assert_eq!(text, DirectFormatter::render(&places(2)));
    }
}
