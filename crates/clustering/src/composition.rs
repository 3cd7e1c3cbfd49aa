use serde::Serialize;

use crate::index::{ClusterId, IndexError, SpatialIndex};
use crate::model::Pinory;

/// Maximum number of friend avatars shown on a cluster badge.
pub const MAX_FRIEND_AVATARS: usize = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositionKind {
    UserOnly,
    FriendOnly,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterComposition {
    pub user_count: usize,
    pub friend_count: usize,
    pub total_count: usize,
    #[serde(rename = "type")]
    pub kind: CompositionKind,
    pub friend_avatars: Vec<String>,
}

impl ClusterComposition {
    /// Classifies a set of leaves. Avatars are taken from friend leaves in
    /// order, skipping those without one, deduplicated and capped.
    pub fn from_leaves<'a, I>(leaves: I) -> Self
    where
        I: IntoIterator<Item = &'a Pinory>,
    {
        let mut user_count = 0;
        let mut friend_count = 0;
        let mut friend_avatars: Vec<String> = Vec::new();

        for leaf in leaves {
            if !leaf.is_friend() {
                user_count += 1;
                continue;
            }
            friend_count += 1;
            if friend_avatars.len() < MAX_FRIEND_AVATARS
                && let Some(url) = leaf.avatar()
                && !friend_avatars.iter().any(|a| a == url)
            {
                friend_avatars.push(url.to_string());
            }
        }

        let kind = if friend_count == 0 {
            CompositionKind::UserOnly
        } else if user_count == 0 {
            CompositionKind::FriendOnly
        } else {
            CompositionKind::Mixed
        };

        Self {
            user_count,
            friend_count,
            total_count: user_count + friend_count,
            kind,
            friend_avatars,
        }
    }
}

/// User/friend breakdown over every leaf of `cluster_id`.
pub fn analyze(index: &SpatialIndex, cluster_id: ClusterId) -> Result<ClusterComposition, IndexError> {
    let leaves = index.all_leaves(cluster_id)?;
    Ok(ClusterComposition::from_leaves(leaves))
}

/// Like [`analyze`], but a traversal failure is logged and yields `None` so
/// the caller can fall back to a plain count badge.
pub fn analyze_or_none(index: &SpatialIndex, cluster_id: ClusterId) -> Option<ClusterComposition> {
    match analyze(index, cluster_id) {
        Ok(c) => Some(c),
        Err(err) => {
            tracing::warn!(cluster_id, error = %err, "cluster composition unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ClusterComposition, CompositionKind, analyze, analyze_or_none};
    use crate::index::{ClusterOptions, SpatialIndex};
    use crate::model::{Creator, Pinory};
    use crate::testing::mixed_cluster;
    use foundation::bounds::GeoBounds;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn friend(id: &str, avatar: Option<&str>) -> Pinory {
        let mut creator = Creator::new(format!("u-{id}"));
        creator.image = avatar.map(str::to_string);
        Pinory::friend(id, 0.0, 0.0, creator)
    }

    #[test]
    fn three_users_two_friends_is_mixed() {
        let leaves = [
            Pinory::new("a", 0.0, 0.0),
            friend("f1", Some("https://cdn/f1.png")),
            Pinory::new("b", 0.0, 0.0),
            friend("f2", Some("https://cdn/f2.png")),
            Pinory::new("c", 0.0, 0.0),
        ];
        let c = ClusterComposition::from_leaves(&leaves);
        assert_eq!(
            c,
            ClusterComposition {
                user_count: 3,
                friend_count: 2,
                total_count: 5,
                kind: CompositionKind::Mixed,
                friend_avatars: vec!["https://cdn/f1.png".to_string(), "https://cdn/f2.png".to_string()],
            }
        );
    }

    #[test]
    fn avatars_skip_missing_and_cap_at_three() {
        let leaves = [
            friend("f1", None),
            friend("f2", Some("2")),
            friend("f3", Some("2")),
            friend("f4", Some("4")),
            friend("f5", Some("5")),
            friend("f6", Some("6")),
        ];
        let c = ClusterComposition::from_leaves(&leaves);
        assert_eq!(c.kind, CompositionKind::FriendOnly);
        assert_eq!(c.friend_count, 6);
        assert_eq!(c.friend_avatars, vec!["2", "4", "5"]);
    }

    #[test]
    fn no_friends_is_user_only() {
        let leaves = [Pinory::new("a", 0.0, 0.0)];
        let c = ClusterComposition::from_leaves(&leaves);
        assert_eq!(c.kind, CompositionKind::UserOnly);
        assert!(c.friend_avatars.is_empty());
    }

    #[test]
    fn analyzes_a_real_cluster() {
        let index = SpatialIndex::build(mixed_cluster(3, 2), ClusterOptions::default());
        let features = index.clusters(&GeoBounds::world(), 8.0);
        assert_eq!(features.len(), 1);
        let id = features[0].as_cluster().unwrap().id;

        let c = analyze(&index, id).unwrap();
        assert_eq!((c.user_count, c.friend_count, c.total_count), (3, 2, 5));
        assert_eq!(c.kind, CompositionKind::Mixed);
        assert!(c.friend_avatars.len() <= 3);
    }

    #[test]
    fn bad_cluster_id_falls_back_to_none() {
        let index = SpatialIndex::build(Arc::new(vec![Pinory::new("a", 0.0, 0.0)]), ClusterOptions::default());
        assert!(analyze(&index, 999).is_err());
        assert_eq!(analyze_or_none(&index, 999), None);
    }

    #[test]
    fn serializes_kind_like_the_web_client() {
        let c = ClusterComposition::from_leaves(&[Pinory::new("a", 0.0, 0.0)]);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "user-only");
        assert_eq!(json["totalCount"], 1);
    }
}
