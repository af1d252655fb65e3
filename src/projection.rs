//! Display projection of stored link lists.
//!
//! Internal links are re-resolved on every read: name, icon, state and URL all
//! come from the entity sources, never from the stored value.

use std::sync::Arc;

use crate::config::DisplayConfig;
use crate::entity::ObjectType;
use crate::references::{parse_links, Link, LinkDisplay};
use crate::resolver::EntityResolver;

pub struct DisplayProjection {
    resolver: Arc<EntityResolver>,
    default_link_icon: String,
}

impl DisplayProjection {
    pub fn new(resolver: Arc<EntityResolver>) -> Self {
        Self {
            resolver,
            default_link_icon: DisplayConfig::default().default_link_icon,
        }
    }

    /// Apply the `[display]` settings from configuration
    pub fn with_display(mut self, display: &DisplayConfig) -> Self {
        self.default_link_icon = display.default_link_icon.clone();
        self
    }

    /// Project a raw stored value; malformed values project to no rows
    pub fn project_value(&self, raw: Option<&str>, culture: Option<&str>) -> Vec<LinkDisplay> {
        match parse_links(raw.unwrap_or_default()) {
            Ok(links) => self.project(&links, culture),
            Err(e) => {
                log::error!("Error getting links: {}", e);
                Vec::new()
            }
        }
    }

    /// One row per link, in order. Unresolvable internal links keep their row
    /// with the display fields left empty.
    pub fn project(&self, links: &[Link], culture: Option<&str>) -> Vec<LinkDisplay> {
        links.iter().map(|link| self.project_link(link, culture)).collect()
    }

    fn project_link(&self, link: &Link, culture: Option<&str>) -> LinkDisplay {
        let mut row = LinkDisplay {
            name: link.name().map(String::from),
            target: link.target().map(String::from),
            query_string: link.query_string().map(String::from),
            ..Default::default()
        };

        match link {
            Link::External { url, .. } => {
                row.icon = Some(self.default_link_icon.clone());
                row.published = Some(true);
                row.trashed = Some(false);
                row.url = url.clone();
            }
            Link::Internal { udi, .. } => {
                row.udi = Some(*udi);
                row.url = self.resolver.resolve_url(udi, culture);
                match self.resolver.resolve_display(udi, culture) {
                    Some(display) => {
                        // Media has no publishing of its own: it is live unless trashed
                        row.published = Some(match udi.entity_type {
                            ObjectType::Media => !display.trashed,
                            _ => display.published_in(culture),
                        });
                        row.node_name = display.name;
                        row.icon = Some(display.icon);
                        row.trashed = Some(display.trashed);
                    }
                    None => log::debug!("Link to {} does not resolve", udi),
                }
            }
            Link::Unrecognized { udi, .. } => log::debug!("Link to {} is not a tracked entity", udi),
        }

        row
    }
}
