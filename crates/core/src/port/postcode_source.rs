// Postcode Source Port
// Paged expansion of a UK postcode area (e.g. "M") into claimable
// subsectors (e.g. "M1 1", "M1 2", ...).

use async_trait::async_trait;

use crate::port::site_processor::ProcessError;

/// One page of subsectors for an area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostcodePage {
    pub subsectors: Vec<String>,
    pub has_more: bool,
}

/// Postcode source interface
#[async_trait]
pub trait PostcodeSource: Send + Sync {
    /// Fetch one page of subsectors for a postcode area (pages start at 0)
    async fn fetch_page(&self, area: &str, page: u32) -> Result<PostcodePage, ProcessError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Static paged source over a fixed subsector list
    pub struct StaticPostcodeSource {
        subsectors: Vec<String>,
        page_size: usize,
    }

    impl StaticPostcodeSource {
        pub fn new(subsectors: Vec<&str>, page_size: usize) -> Self {
            Self {
                subsectors: subsectors.into_iter().map(String::from).collect(),
                page_size,
            }
        }
    }

    #[async_trait]
    impl PostcodeSource for StaticPostcodeSource {
        async fn fetch_page(&self, _area: &str, page: u32) -> Result<PostcodePage, ProcessError> {
            let start = page as usize * self.page_size;
            let end = (start + self.page_size).min(self.subsectors.len());
            let slice = if start >= self.subsectors.len() {
                &[]
            } else {
                &self.subsectors[start..end]
            };
            Ok(PostcodePage {
                subsectors: slice.to_vec(),
                has_more: end < self.subsectors.len(),
            })
        }
    }
}
