//! Encoded resource string parsing
//!
//! Format: `id|name|vendor|resourceType|uri[|region|secretURL|secretKey]`,
//! accepting both `|` and `;` as the field delimiter.

use crate::error::Error;

/// The kind of messaging resource an [`EncodedResource`] names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceType {
    /// A pub/sub topic
    Topic,
    /// A subscription to a topic
    Subscription,
    /// A point-to-point queue
    Queue,
}

impl ResourceType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "topic" => Some(ResourceType::Topic),
            "subscription" => Some(ResourceType::Subscription),
            "queue" => Some(ResourceType::Queue),
            _ => None,
        }
    }
}

/// A decoded `id|name|vendor|resourceType|uri[|region|secretURL|secretKey]` string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedResource {
    /// Resource identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Cloud vendor tag (e.g. "aws", "gcp")
    pub vendor: String,
    /// What kind of messaging resource this is
    pub resource_type: ResourceType,
    /// The resource's URI
    pub uri: String,
    /// Optional region
    pub region: Option<String>,
    /// Optional URL to a secret containing credentials
    pub secret_url: Option<String>,
    /// Optional key within the secret
    pub secret_key: Option<String>,
}

/// Parse an encoded resource string. Accepts both `|` and `;` as the
/// delimiter; rejects missing required fields or an unrecognized
/// `resourceType`.
pub fn parse(input: &str) -> Result<EncodedResource, Error> {
    let delimiter = if input.contains('|') { '|' } else { ';' };
    let fields: Vec<&str> = input.split(delimiter).collect();

    if fields.len() < 5 {
        return Err(Error::InvalidResource {
            input: input.to_string(),
            reason: format!("expected at least 5 fields, found {}", fields.len()),
        });
    }

    let [id, name, vendor, resource_type, uri] = [fields[0], fields[1], fields[2], fields[3], fields[4]];
    if id.is_empty() || name.is_empty() || vendor.is_empty() || uri.is_empty() {
        return Err(Error::InvalidResource {
            input: input.to_string(),
            reason: "id, name, vendor, and uri must be non-empty".to_string(),
        });
    }

    let resource_type = ResourceType::parse(resource_type).ok_or_else(|| Error::InvalidResource {
        input: input.to_string(),
        reason: format!("unrecognized resourceType {resource_type:?}, expected topic|subscription|queue"),
    })?;

    Ok(EncodedResource {
        id: id.to_string(),
        name: name.to_string(),
        vendor: vendor.to_string(),
        resource_type,
        uri: uri.to_string(),
        region: fields.get(5).filter(|s| !s.is_empty()).map(|s| s.to_string()),
        secret_url: fields.get(6).filter(|s| !s.is_empty()).map(|s| s.to_string()),
        secret_key: fields.get(7).filter(|s| !s.is_empty()).map(|s| s.to_string()),
    })
}
