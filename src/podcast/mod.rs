mod directory;
mod feed;

use chrono::{DateTime, FixedOffset};

pub use directory::{DirectoryClient, DirectoryError, ITUNES_BASE_URL, ItunesDirectory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub guid: String,
    pub title: String,
    pub enclosure_url: String,
    pub published: Option<DateTime<FixedOffset>>,
}

/// A fetched feed. Episodes are ordered newest first and the order is fixed
/// for the lifetime of the value; the feed URL is the stable identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Podcast {
    pub url: String,
    pub title: String,
    pub episodes: Vec<Episode>,
}

impl Podcast {
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn latest(&self) -> Option<&Episode> {
        self.episodes.first()
    }

    pub fn episode_at(&self, index: usize) -> Option<&Episode> {
        self.episodes.get(index)
    }

    pub fn find_by_guid(&self, guid: &str) -> Option<&Episode> {
        self.episodes.iter().find(|episode| episode.guid == guid)
    }

    pub fn index_of(&self, episode: &Episode) -> Option<usize> {
        self.index_of_guid(&episode.guid)
    }

    pub fn index_of_guid(&self, guid: &str) -> Option<usize> {
        self.episodes.iter().position(|episode| episode.guid == guid)
    }
}

#[cfg(test)]
pub(crate) fn sample_podcast(url: &str, title: &str, guids: &[&str]) -> Podcast {
    Podcast {
        url: url.to_string(),
        title: title.to_string(),
        episodes: guids
            .iter()
            .map(|guid| Episode {
                guid: (*guid).to_string(),
                title: format!("Episode {guid}"),
                enclosure_url: format!("{url}/media/{guid}.mp3"),
                published: None,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_resolve_by_index_and_guid() {
        let podcast = sample_podcast("https://feeds.example/x", "X", &["e0", "e1", "e2"]);

        assert_eq!(podcast.len(), 3);
        assert_eq!(podcast.latest().map(|ep| ep.guid.as_str()), Some("e0"));
        assert_eq!(podcast.episode_at(2).map(|ep| ep.guid.as_str()), Some("e2"));
        assert!(podcast.episode_at(3).is_none());

        let e1 = podcast.find_by_guid("e1").expect("e1 should exist").clone();
        assert_eq!(podcast.index_of(&e1), Some(1));
        assert!(podcast.find_by_guid("pruned").is_none());
        assert_eq!(podcast.index_of_guid("pruned"), None);
    }

    #[test]
    fn empty_podcast_has_no_latest_episode() {
        let podcast = sample_podcast("https://feeds.example/empty", "Empty", &[]);
        assert!(podcast.is_empty());
        assert!(podcast.latest().is_none());
        assert!(podcast.episode_at(0).is_none());
    }
}
