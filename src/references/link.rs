//! Link-picker values: the stored wire shape and the parsed form.

use serde::{Deserialize, Serialize};

use crate::entity::EntityIdentifier;
use crate::error::{RelgraphError, Result};

/// Stored shape of one link-picker entry.
///
/// `udi` is kept as raw text; each entry's identifier is parsed on its own
/// when converting to [`Link`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
}

/// A parsed link: to an entity in the graph, to an external URL, or to an
/// identifier this crate does not model (another entity type, or malformed).
#[derive(Debug, Clone, PartialEq)]
pub enum Link {
    Internal {
        udi: EntityIdentifier,
        name: Option<String>,
        target: Option<String>,
        query_string: Option<String>,
    },
    External {
        url: Option<String>,
        name: Option<String>,
        target: Option<String>,
        query_string: Option<String>,
    },
    /// Never tracked; kept so the entry survives a round trip.
    Unrecognized {
        udi: String,
        name: Option<String>,
        target: Option<String>,
        query_string: Option<String>,
    },
}

impl Link {
    pub fn udi(&self) -> Option<&EntityIdentifier> {
        match self {
            Link::Internal { udi, .. } => Some(udi),
            Link::External { .. } | Link::Unrecognized { .. } => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Link::Internal { name, .. } | Link::External { name, .. } | Link::Unrecognized { name, .. } => {
                name.as_deref()
            }
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Link::Internal { target, .. } | Link::External { target, .. } | Link::Unrecognized { target, .. } => {
                target.as_deref()
            }
        }
    }

    pub fn query_string(&self) -> Option<&str> {
        match self {
            Link::Internal { query_string, .. }
            | Link::External { query_string, .. }
            | Link::Unrecognized { query_string, .. } => query_string.as_deref(),
        }
    }
}

impl From<LinkDto> for Link {
    /// A UDI makes the link internal; any stored literal URL is then ignored.
    fn from(dto: LinkDto) -> Self {
        let Some(raw) = dto.udi else {
            return Link::External {
                url: dto.url,
                name: dto.name,
                target: dto.target,
                query_string: dto.query_string,
            };
        };
        match raw.parse::<EntityIdentifier>() {
            Ok(udi) => Link::Internal {
                udi,
                name: dto.name,
                target: dto.target,
                query_string: dto.query_string,
            },
            Err(e) => {
                log::debug!("Link to '{}' is not a tracked entity: {}", raw, e);
                Link::Unrecognized {
                    udi: raw,
                    name: dto.name,
                    target: dto.target,
                    query_string: dto.query_string,
                }
            }
        }
    }
}

impl From<&Link> for LinkDto {
    fn from(link: &Link) -> Self {
        match link {
            Link::Internal { udi, name, target, query_string } => LinkDto {
                name: name.clone(),
                target: target.clone(),
                udi: Some(udi.to_string()),
                url: None,
                query_string: query_string.clone(),
            },
            Link::External { url, name, target, query_string } => LinkDto {
                name: name.clone(),
                target: target.clone(),
                udi: None,
                url: url.clone(),
                query_string: query_string.clone(),
            },
            Link::Unrecognized { udi, name, target, query_string } => LinkDto {
                name: name.clone(),
                target: target.clone(),
                udi: Some(udi.clone()),
                url: None,
                query_string: query_string.clone(),
            },
        }
    }
}

/// Editor-facing view of a link, as produced by the display projection.
///
/// Display fields are `None` when an internal link's entity could not be
/// resolved, so a broken reference stays visible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkDisplay {
    pub icon: Option<String>,
    pub name: Option<String>,
    pub node_name: Option<String>,
    pub published: Option<bool>,
    pub query_string: Option<String>,
    pub target: Option<String>,
    pub trashed: Option<bool>,
    pub udi: Option<EntityIdentifier>,
    pub url: Option<String>,
}

/// Parse a stored link list
///
/// Empty input is an empty list. Anything that is not a JSON array of link
/// objects is a `Parse` error.
pub fn parse_links(raw: &str) -> Result<Vec<Link>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let dtos: Vec<LinkDto> = serde_json::from_str(raw)
        .map_err(|e| RelgraphError::Parse(format!("Invalid link list: {}", e)))?;
    Ok(dtos.into_iter().map(Link::from).collect())
}

/// Normalize editor links into their stored form
///
/// An empty list stores nothing. Internal links never keep a literal URL.
pub fn to_storage(links: &[LinkDisplay]) -> Result<Option<String>> {
    if links.is_empty() {
        return Ok(None);
    }
    let dtos: Vec<LinkDto> = links
        .iter()
        .map(|link| LinkDto {
            name: link.name.clone(),
            target: link.target.clone(),
            udi: link.udi.map(|u| u.to_string()),
            url: if link.udi.is_none() { link.url.clone() } else { None },
            query_string: link.query_string.clone(),
        })
        .collect();
    serde_json::to_string(&dtos)
        .map(Some)
        .map_err(|e| RelgraphError::Parse(format!("Failed to serialize links: {}", e)))
}

/// Parse an editor payload (a JSON array of [`LinkDisplay`]) and normalize it for storage
pub fn from_editor(raw: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(None);
    };
    let links: Vec<LinkDisplay> = serde_json::from_str(raw)
        .map_err(|e| RelgraphError::Parse(format!("Invalid editor links: {}", e)))?;
    to_storage(&links)
}
