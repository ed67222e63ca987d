/// Builds the callback URLs embedded in instruction documents. Continuation
/// state (escalation seed, attempt index, parent call) travels in the URL.
#[derive(Debug, Clone)]
pub struct CallbackUrls {
    base: String,
}

impl CallbackUrls {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn gathered(&self) -> String {
        self.url("/call/gathered")
    }

    pub fn gather_failed(&self) -> String {
        self.url("/call/gather_failed")
    }

    pub fn human(&self, seed: u64, index: usize) -> String {
        self.url(&format!("/call/human/{}/{}", seed, index))
    }

    pub fn human_pickup(&self, seed: u64, index: usize, parent: &str) -> String {
        self.url(&format!(
            "/call/human/{}/{}/pickup?parent={}",
            seed,
            index,
            urlencoding::encode(parent)
        ))
    }

    pub fn human_ended(&self, seed: u64, index: usize) -> String {
        self.url(&format!("/call/human/{}/{}/ended", seed, index))
    }

    pub fn forward_pickup(&self, parent: &str) -> String {
        self.url(&format!(
            "/call/forward/pickup?parent={}",
            urlencoding::encode(parent)
        ))
    }

    pub fn forward_ended(&self) -> String {
        self.url("/call/forward/ended")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_carry_continuation_state() {
        let urls = CallbackUrls::new("https://example.org/line/");
        assert_eq!(urls.gathered(), "https://example.org/line/call/gathered");
        assert_eq!(urls.human(42, 3), "https://example.org/line/call/human/42/3");
        assert_eq!(
            urls.human_pickup(42, 3, "CA 1&2"),
            "https://example.org/line/call/human/42/3/pickup?parent=CA%201%262"
        );
        assert_eq!(
            urls.forward_pickup("CA1"),
            "https://example.org/line/call/forward/pickup?parent=CA1"
        );
    }
}
