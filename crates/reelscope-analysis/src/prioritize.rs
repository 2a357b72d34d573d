//! Deterministic post and asset selection under caps.
//!
//! Given a qualified pool, [`prioritize`] picks at most `post_cap` posts and
//! at most `asset_cap` media asset ids:
//!
//! 1. Score each post by engagement (`likes + 2×comments + 0.1×views`) plus
//!    a recency term small enough to only ever break exact ties.
//! 2. Reserve `max(1, round(post_cap × client_quota_ratio))` slots for client
//!    posts and the rest for competitors.
//! 3. Fill the client quota with the top-scored client posts.
//! 4. Fill the competitor quota round robin across `(platform, handle)`
//!    groups, taking at most `per_handle_cap` posts from any group.
//! 5. Backfill unused slots from the score-sorted remainder, any source.
//! 6. Walk the selection in score order and collect distinct asset ids.
//!
//! Ordering ties fall back to `post_id` so the result never depends on the
//! input order.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use reelscope_core::{AssetId, ContentSource, QualifiedPost};
use serde::Serialize;

pub const CLIENT_QUOTA_RATIO: f64 = 0.65;
pub const PER_HANDLE_CAP: usize = 4;

const COMMENT_WEIGHT: f64 = 2.0;
const VIEW_WEIGHT: f64 = 0.1;
// Unix seconds (~1.7e9) scaled to ~1.7e-4, below the smallest engagement
// step of 0.1 from a single view.
const RECENCY_SCALE: f64 = 1e-13;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrioritizationParams {
    pub post_cap: usize,
    pub asset_cap: usize,
    pub client_quota_ratio: f64,
    pub per_handle_cap: usize,
}

impl PrioritizationParams {
    #[must_use]
    pub fn new(post_cap: usize, asset_cap: usize) -> Self {
        Self {
            post_cap,
            asset_cap,
            client_quota_ratio: CLIENT_QUOTA_RATIO,
            per_handle_cap: PER_HANDLE_CAP,
        }
    }

    /// Client slots for this cap: never zero unless `post_cap` is zero.
    #[must_use]
    pub fn client_quota(&self) -> usize {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let raw = (self.post_cap as f64 * self.client_quota_ratio.clamp(0.0, 1.0)).round() as usize;
        raw.max(1).min(self.post_cap)
    }

    #[must_use]
    pub fn competitor_quota(&self) -> usize {
        self.post_cap - self.client_quota()
    }
}

/// Which step of the algorithm picked a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionLane {
    ClientQuota,
    CompetitorRoundRobin,
    Backfill,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPost<'a> {
    pub post: &'a QualifiedPost,
    pub score: f64,
    pub lane: SelectionLane,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection<'a> {
    /// Selected posts in descending score order.
    pub posts: Vec<SelectedPost<'a>>,
    /// Distinct asset ids in the order they were reached.
    pub asset_ids: Vec<AssetId>,
}

impl Selection<'_> {
    #[must_use]
    pub fn count_lane(&self, lane: SelectionLane) -> usize {
        self.posts.iter().filter(|p| p.lane == lane).count()
    }

    #[must_use]
    pub fn count_source(&self, source: ContentSource) -> usize {
        self.posts.iter().filter(|p| p.post.source == source).count()
    }

    /// Platform of the first selected post that links `asset_id`.
    #[must_use]
    pub fn platform_for(&self, asset_id: AssetId) -> Option<&str> {
        self.posts
            .iter()
            .find(|p| p.post.media_asset_ids.contains(&asset_id))
            .map(|p| p.post.platform.as_str())
    }

    /// Compact summary for run diagnostics.
    #[must_use]
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "posts": self.posts.len(),
            "clientPosts": self.count_source(ContentSource::Client),
            "competitorPosts": self.count_source(ContentSource::Competitor),
            "backfilled": self.count_lane(SelectionLane::Backfill),
            "assetIds": self.asset_ids.len(),
        })
    }
}

/// Engagement score with a recency tiebreak.
#[must_use]
pub fn score_post(post: &QualifiedPost) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let engagement = post.likes as f64
        + COMMENT_WEIGHT * post.comments as f64
        + VIEW_WEIGHT * post.views as f64;
    #[allow(clippy::cast_precision_loss)]
    let recency = post
        .posted_at
        .map_or(0.0, |at| at.timestamp().max(0) as f64 * RECENCY_SCALE);
    engagement + recency
}

#[derive(Debug, Clone, Copy)]
struct Scored<'a> {
    index: usize,
    post: &'a QualifiedPost,
    score: f64,
}

fn by_score_desc(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.post.post_id.cmp(&b.post.post_id))
        .then_with(|| a.index.cmp(&b.index))
}

/// Selects posts and asset ids from `pool` under `params`.
#[must_use]
pub fn prioritize<'a>(pool: &'a [QualifiedPost], params: &PrioritizationParams) -> Selection<'a> {
    if params.post_cap == 0 || pool.is_empty() {
        return Selection::default();
    }

    let mut ranked: Vec<Scored<'a>> = pool
        .iter()
        .enumerate()
        .map(|(index, post)| Scored {
            index,
            post,
            score: score_post(post),
        })
        .collect();
    ranked.sort_by(by_score_desc);

    let mut picked: Vec<(Scored<'a>, SelectionLane)> = Vec::with_capacity(params.post_cap);
    let mut taken: HashSet<usize> = HashSet::new();

    for s in ranked
        .iter()
        .filter(|s| s.post.source == ContentSource::Client)
        .take(params.client_quota())
    {
        taken.insert(s.index);
        picked.push((*s, SelectionLane::ClientQuota));
    }

    for s in fill_competitors(&ranked, params.competitor_quota(), params.per_handle_cap) {
        taken.insert(s.index);
        picked.push((s, SelectionLane::CompetitorRoundRobin));
    }

    let open = params.post_cap.saturating_sub(picked.len());
    if open > 0 {
        let backfill: Vec<Scored<'a>> = ranked
            .iter()
            .filter(|s| !taken.contains(&s.index))
            .take(open)
            .copied()
            .collect();
        for s in backfill {
            taken.insert(s.index);
            picked.push((s, SelectionLane::Backfill));
        }
    }

    picked.sort_by(|(a, _), (b, _)| by_score_desc(a, b));

    let mut seen_assets = HashSet::new();
    let mut asset_ids = Vec::new();
    'walk: for (s, _) in &picked {
        for id in &s.post.media_asset_ids {
            if asset_ids.len() >= params.asset_cap {
                break 'walk;
            }
            if seen_assets.insert(*id) {
                asset_ids.push(*id);
            }
        }
    }

    Selection {
        posts: picked
            .into_iter()
            .map(|(s, lane)| SelectedPost {
                post: s.post,
                score: s.score,
                lane,
            })
            .collect(),
        asset_ids,
    }
}

/// Round robin over competitor `(platform, handle)` groups.
///
/// Groups are visited in order of their best post's rank. Each visit takes the
/// group's next-best post unless the group already gave `per_handle_cap`.
/// Stops when `quota` is met or a full round takes nothing.
fn fill_competitors<'a>(
    ranked: &[Scored<'a>],
    quota: usize,
    per_handle_cap: usize,
) -> Vec<Scored<'a>> {
    let mut group_order: Vec<(&str, &str)> = Vec::new();
    let mut groups: HashMap<(&str, &str), Vec<Scored<'a>>> = HashMap::new();

    for s in ranked
        .iter()
        .filter(|s| s.post.source == ContentSource::Competitor)
    {
        let key = (s.post.platform.as_str(), s.post.handle.as_str());
        groups
            .entry(key)
            .or_insert_with(|| {
                group_order.push(key);
                Vec::new()
            })
            .push(*s);
    }

    let mut out = Vec::with_capacity(quota);
    let mut cursor: HashMap<(&str, &str), usize> = HashMap::new();

    while out.len() < quota {
        let mut progressed = false;
        for key in &group_order {
            if out.len() >= quota {
                break;
            }
            let next = cursor.entry(*key).or_insert(0);
            if *next >= per_handle_cap {
                continue;
            }
            if let Some(s) = groups.get(key).and_then(|g| g.get(*next)) {
                out.push(*s);
                *next += 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    out
}
