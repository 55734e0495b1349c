// src/sources/catalogs.rs
use std::fmt;

use crate::error::{LinkerError, LinkerResult};

/// A supported (catalog, entity type) pair and where its data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTarget {
    pub catalog: &'static str,
    pub entity: &'static str,
    /// Wikidata property holding this catalog's identifiers.
    pub pid: &'static str,
    pub base_table: &'static str,
    pub link_table: Option<&'static str>,
    pub nlp_table: Option<&'static str>,
}

impl fmt::Display for CatalogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.catalog, self.entity)
    }
}

const fn target(
    catalog: &'static str,
    entity: &'static str,
    pid: &'static str,
    base_table: &'static str,
    link_table: Option<&'static str>,
    nlp_table: Option<&'static str>,
) -> CatalogTarget {
    CatalogTarget {
        catalog,
        entity,
        pid,
        base_table,
        link_table,
        nlp_table,
    }
}

pub const TARGETS: [CatalogTarget; 12] = [
    target(
        "discogs",
        "musician",
        "P1953",
        "discogs_musician",
        Some("discogs_musician_link"),
        Some("discogs_musician_nlp"),
    ),
    target(
        "discogs",
        "band",
        "P1953",
        "discogs_group",
        Some("discogs_group_link"),
        Some("discogs_group_nlp"),
    ),
    target(
        "discogs",
        "musical_work",
        "P1954",
        "discogs_master",
        None,
        None,
    ),
    target("imdb", "actor", "P345", "imdb_actor", None, None),
    target("imdb", "director", "P345", "imdb_director", None, None),
    target("imdb", "musician", "P345", "imdb_musician", None, None),
    target("imdb", "producer", "P345", "imdb_producer", None, None),
    target("imdb", "writer", "P345", "imdb_writer", None, None),
    target("imdb", "audiovisual_work", "P345", "imdb_movie", None, None),
    target(
        "musicbrainz",
        "musician",
        "P434",
        "musicbrainz_artist",
        Some("musicbrainz_artist_link"),
        None,
    ),
    target(
        "musicbrainz",
        "band",
        "P434",
        "musicbrainz_band",
        Some("musicbrainz_band_link"),
        None,
    ),
    target(
        "musicbrainz",
        "musical_work",
        "P436",
        "musicbrainz_release_group",
        Some("musicbrainz_release_group_link"),
        None,
    ),
];

pub fn supported() -> String {
    TARGETS
        .iter()
        .map(|t| format!("{}/{}", t.catalog, t.entity))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn lookup(catalog: &str, entity: &str) -> LinkerResult<&'static CatalogTarget> {
    let catalog_name = catalog.trim().to_lowercase();
    let entity_name = entity.trim().to_lowercase();
    TARGETS
        .iter()
        .find(|t| t.catalog == catalog_name && t.entity == entity_name)
        .ok_or_else(|| LinkerError::UnknownTarget {
            catalog: catalog.to_string(),
            entity: entity.to_string(),
            allowed: supported(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let target = lookup("Discogs", "musician").unwrap();
        assert_eq!(target.pid, "P1953");
        assert_eq!(target.nlp_table, Some("discogs_musician_nlp"));
        assert_eq!(target.to_string(), "discogs musician");
    }

    #[test]
    fn test_unknown_target_lists_supported() {
        match lookup("imdb", "band") {
            Err(LinkerError::UnknownTarget { allowed, .. }) => {
                assert!(allowed.contains("imdb/actor"));
                assert!(allowed.contains("musicbrainz/band"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
