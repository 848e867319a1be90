//! Character page availability
//!
//! Classifies an upstream response before its body is trusted, and maps the outcome to
//! the status a consumer should answer with.

use serde::Serialize;

use crate::engine::Extractor;
use crate::error::Result;
use crate::fetch::FetchResponse;
use crate::value::Record;

pub const MAINTENANCE_MARKER: &str = "The Lodestone is currently down for maintenance";

// Players can write this into their own profile text and spoof the check.
pub const PRIVATE_PROFILE_MARKER: &str = "This character's profile is private";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultCode {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "profile_private")]
    ProfilePrivate,
    #[serde(rename = "character_hidden")]
    CharacterHidden,
    #[serde(rename = "not_found")]
    NotFound,
    #[serde(rename = "maintenance")]
    Maintenance,
    #[serde(rename = "error")]
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeMeta {
    pub result_code: ResultCode,
    pub upstream_status_code: u16,
}

impl ScrapeMeta {
    /// Status to answer consumers with
    pub fn response_status(&self) -> u16 {
        match self.result_code {
            ResultCode::Success | ResultCode::ProfilePrivate => 200,
            ResultCode::CharacterHidden => 403,
            ResultCode::NotFound => 404,
            ResultCode::Maintenance => 503,
            ResultCode::Error if self.upstream_status_code >= 400 => self.upstream_status_code,
            ResultCode::Error => 500,
        }
    }
}

/// Classify by status first, then by body markers. First match wins.
pub fn classify(body: &str, status: u16) -> ScrapeMeta {
    let result_code = match status {
        403 => ResultCode::CharacterHidden,
        404 => ResultCode::NotFound,
        502 | 503 if body.contains(MAINTENANCE_MARKER) => ResultCode::Maintenance,
        s if s >= 400 => ResultCode::Error,
        200 if body.contains(PRIVATE_PROFILE_MARKER) => ResultCode::ProfilePrivate,
        _ => ResultCode::Success,
    };

    ScrapeMeta {
        result_code,
        upstream_status_code: status,
    }
}

/// Extracted page together with its availability
#[derive(Debug, Clone)]
pub struct ClassifiedPage {
    /// Parsed whatever the outcome; private profiles still carry some data
    pub data: Record,
    pub scrape_meta: ScrapeMeta,
    pub response_status_code: u16,
}

pub fn classify_response(
    extractor: &Extractor,
    response: &FetchResponse,
    type_name: &str,
) -> Result<ClassifiedPage> {
    let scrape_meta = classify(&response.body, response.status);
    let data = extractor.load_from_str(&response.body, type_name)?;

    Ok(ClassifiedPage {
        data,
        response_status_code: scrape_meta.response_status(),
        scrape_meta,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fetch::Loader;
    use crate::schema::{ExtractionRule, SchemaRegistry, TypeDef};
    use crate::testing::MockFetcher;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify("", 403).result_code, ResultCode::CharacterHidden);
        assert_eq!(classify("", 404).result_code, ResultCode::NotFound);
        assert_eq!(classify(MAINTENANCE_MARKER, 503).result_code, ResultCode::Maintenance);
        assert_eq!(classify(MAINTENANCE_MARKER, 502).result_code, ResultCode::Maintenance);
        assert_eq!(classify("bad gateway", 502).result_code, ResultCode::Error);
        assert_eq!(classify("", 500).result_code, ResultCode::Error);
        assert_eq!(classify("<p>ok</p>", 200).result_code, ResultCode::Success);
    }

    #[test]
    fn test_private_marker_only_on_200() {
        let body = format!("<div>{}</div>", PRIVATE_PROFILE_MARKER);
        assert_eq!(classify(&body, 200).result_code, ResultCode::ProfilePrivate);
        assert_eq!(classify(&body, 204).result_code, ResultCode::Success);
        assert_eq!(classify(&body, 404).result_code, ResultCode::NotFound);
    }

    #[test]
    fn test_response_status_mapping() {
        assert_eq!(classify("", 200).response_status(), 200);
        assert_eq!(classify(PRIVATE_PROFILE_MARKER, 200).response_status(), 200);
        assert_eq!(classify("", 403).response_status(), 403);
        assert_eq!(classify("", 404).response_status(), 404);
        assert_eq!(classify(MAINTENANCE_MARKER, 502).response_status(), 503);
        assert_eq!(classify("", 429).response_status(), 429);
    }

    #[test]
    fn test_meta_wire_format() {
        let meta = classify("", 403);
        assert_eq!(
            serde_json::to_value(meta).unwrap(),
            serde_json::json!({ "resultCode": "character_hidden", "upstreamStatusCode": 403 })
        );
    }

    #[tokio::test]
    async fn test_private_profile_still_parsed() {
        let url = "https://na.finalfantasyxiv.com/lodestone/character/1/";
        let body = format!(
            "<h1 class=\"name\">Alpha Beta</h1><p>{}</p>",
            PRIVATE_PROFILE_MARKER
        );
        let fetcher = MockFetcher::new().with_page(url, &body);

        let mut registry = SchemaRegistry::new();
        registry.register(
            TypeDef::new("Profile").rule(ExtractionRule::new("name", "//h1[@class='name']/text()")),
        );
        let loader = Loader::new(Arc::new(fetcher), Arc::new(registry));

        let page = loader.load_with_availability(url, "Profile").await.unwrap();
        assert_eq!(page.scrape_meta.result_code, ResultCode::ProfilePrivate);
        assert_eq!(page.response_status_code, 200);
        assert_eq!(page.data.str("name"), Some("Alpha Beta"));
    }

    #[tokio::test]
    async fn test_hidden_character_does_not_error() {
        let url = "https://na.finalfantasyxiv.com/lodestone/character/2/";
        let fetcher = MockFetcher::new().with_status(url, 403, "<h1>Forbidden</h1>");

        let mut registry = SchemaRegistry::new();
        registry.register(TypeDef::new("Profile").rule(ExtractionRule::new("name", "//h2/text()")));
        let loader = Loader::new(Arc::new(fetcher), Arc::new(registry));

        let page = loader.load_with_availability(url, "Profile").await.unwrap();
        assert_eq!(page.scrape_meta.result_code, ResultCode::CharacterHidden);
        assert_eq!(page.response_status_code, 403);
        assert!(page.data.get("name").is_absent());
    }
}
