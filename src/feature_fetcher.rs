//! An HTTP client that fetches feature definitions from the server.

use reqwest::Url;

use crate::decrypt::decrypt_features;
use crate::error::{DecryptionError, Error, Result};
use crate::model::{Feature, FeatureMap, FeaturesPayload, TryParse};

/// A client that fetches feature definitions from the features endpoint.
pub(crate) struct FeatureFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    url: Url,
    decryption_key: Option<String>,
}

impl FeatureFetcher {
    pub fn new(
        api_host: &str,
        client_key: &str,
        decryption_key: Option<String>,
    ) -> Result<FeatureFetcher> {
        let url = Url::parse(&format!(
            "{}/api/features/{}",
            api_host.trim_end_matches('/'),
            client_key
        ))
        .map_err(Error::InvalidApiHost)?;

        Ok(FeatureFetcher {
            client: reqwest::Client::new(),
            url,
            decryption_key,
        })
    }

    pub async fn fetch_features(&self) -> Result<FeatureMap> {
        log::debug!(target: "growthbook", "fetching features from {}", self.url);
        let response = self.client.get(self.url.clone()).send().await?;

        let response = response.error_for_status().map_err(|err| {
            log::warn!(target: "growthbook", "received non-success response while fetching features: {err:?}");
            Error::from(err)
        })?;

        let payload: FeaturesPayload = response.json().await?;
        let features = decode_payload(payload, self.decryption_key.as_deref())?;

        log::debug!(target: "growthbook", "successfully fetched {} features", features.len());
        Ok(features)
    }
}

/// Turn a response payload into a feature map, decrypting if necessary.
pub(crate) fn decode_payload(
    payload: FeaturesPayload,
    decryption_key: Option<&str>,
) -> Result<FeatureMap> {
    if let Some(features) = payload.features {
        return Ok(collect_features(features));
    }

    if let Some(encrypted) = payload.encrypted_features {
        let key = decryption_key.ok_or(Error::Decryption(DecryptionError::MissingKey))?;
        let plaintext = decrypt_features(&encrypted, key)?;
        // The decrypted plaintext is the bare features object, without a `features` wrapper.
        let features: std::collections::HashMap<String, TryParse<Feature>> =
            serde_json::from_str(&plaintext)
                .map_err(|_| Error::Decryption(DecryptionError::InvalidJson))?;
        return Ok(collect_features(features));
    }

    Err(Error::UnexpectedPayload)
}

fn collect_features(
    features: std::collections::HashMap<String, TryParse<Feature>>,
) -> FeatureMap {
    features
        .into_iter()
        .filter_map(|(id, parsed)| match parsed {
            TryParse::Parsed(feature) => Some((id, feature)),
            TryParse::ParseFailed(_) => {
                log::warn!(target: "growthbook", "failed to parse feature {id:?}; skipping it");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::decrypt::encrypt_features;

    const KEY: &str = "AAECAwQFBgcICQoLDA0ODw==";

    fn payload(value: serde_json::Value) -> FeaturesPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn decodes_plain_features() {
        let payload = payload(json!({"features": {"x": {"defaultValue": 42}}}));
        let features = decode_payload(payload, None).unwrap();
        assert_eq!(features["x"].default_value, json!(42));
    }

    #[test]
    fn drops_unparseable_features() {
        let payload = payload(json!({"features": {
            "good": {"defaultValue": 1},
            "bad": {"rules": 5}
        }}));
        let features = decode_payload(payload, None).unwrap();
        assert!(features.contains_key("good"));
        assert!(!features.contains_key("bad"));
    }

    #[test]
    fn decodes_encrypted_features() {
        let plaintext = json!({"x": {"defaultValue": true, "rules": []}}).to_string();
        let encrypted = encrypt_features(&plaintext, KEY, b"0123456789abcdef");

        let payload = payload(json!({"encryptedFeatures": encrypted}));
        let features = decode_payload(payload, Some(KEY)).unwrap();
        assert_eq!(features["x"].default_value, json!(true));
    }

    #[test]
    fn encrypted_payload_without_key_is_an_error() {
        let payload = payload(json!({"encryptedFeatures": "aXY.Y3Q"}));
        assert!(matches!(
            decode_payload(payload, None),
            Err(Error::Decryption(DecryptionError::MissingKey))
        ));
    }

    #[test]
    fn encrypted_garbage_is_a_decryption_error() {
        let encrypted = encrypt_features("this is not json", KEY, b"0123456789abcdef");
        let payload = payload(json!({"encryptedFeatures": encrypted}));
        assert!(matches!(
            decode_payload(payload, Some(KEY)),
            Err(Error::Decryption(DecryptionError::InvalidJson))
        ));
    }

    #[test]
    fn empty_payload_is_an_error() {
        let payload = payload(json!({}));
        assert!(matches!(
            decode_payload(payload, None),
            Err(Error::UnexpectedPayload)
        ));
    }

    #[test]
    fn trailing_slashes_are_stripped_from_the_host() {
        let fetcher = FeatureFetcher::new("https://cdn.growthbook.io///", "sdk-key", None).unwrap();
        assert_eq!(
            fetcher.url.as_str(),
            "https://cdn.growthbook.io/api/features/sdk-key"
        );
    }
}
