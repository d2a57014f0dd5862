//! Patch templates and patch assembly.
//!
//! A [`Patch`] targets one existing document and carries one content
//! [`Mutation`] followed by a touch of `/_ts`, so the latency probe keeps
//! seeing fresh timestamps while a run is only patching.
//!
//! Content mutations come from [`PatchTemplates`], an infinite iterator over a
//! fixed catalog of templates. The catalog is reshuffled on every pass and each
//! template renders a fresh value per draw.

use rand::{Rng, seq::SliceRandom};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::trace;

use crate::{
    Error, PatchStyle,
    document::{self, TS_FIELD},
    id_space::{IdSpace, format_id},
    words,
};

/// JSON patch operation.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Add a member or append to an array
    Add,
    /// Replace an existing value
    Replace,
}

/// A single field-level mutation.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Mutation {
    /// The operation to apply
    pub op: Op,
    /// JSON pointer to the target field
    pub path: String,
    /// The new value
    pub value: Value,
}

impl Mutation {
    /// Touch the document timestamp with the current time.
    #[must_use]
    pub fn touch_timestamp() -> Self {
        Self {
            op: Op::Add,
            path: format!("/{TS_FIELD}"),
            value: Value::from(crate::now_micros()),
        }
    }
}

/// A patch against one existing document.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Patch {
    /// Id of the patched document
    #[serde(rename = "_id")]
    pub id: String,
    /// Mutations, applied in order
    pub patch: Vec<Mutation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Template {
    Age,
    IsActive,
    Balance,
    Email,
    Phone,
    Company,
    FirstName,
    City,
    Latitude,
    FriendAge,
    FirstTag,
    About,
    Nickname,
    Score,
    Verified,
    Preferences,
    AppendTag,
}

const REPLACE_CATALOG: [Template; 12] = [
    Template::Age,
    Template::IsActive,
    Template::Balance,
    Template::Email,
    Template::Phone,
    Template::Company,
    Template::FirstName,
    Template::City,
    Template::Latitude,
    Template::FriendAge,
    Template::FirstTag,
    Template::About,
];

const ADD_CATALOG: [Template; 5] = [
    Template::Nickname,
    Template::Score,
    Template::Verified,
    Template::Preferences,
    Template::AppendTag,
];

impl Template {
    fn catalog(style: PatchStyle) -> &'static [Template] {
        match style {
            PatchStyle::Replace => &REPLACE_CATALOG,
            PatchStyle::Add => &ADD_CATALOG,
        }
    }

    fn render<R>(self, rng: &mut R) -> Mutation
    where
        R: Rng + ?Sized,
    {
        let (op, path, value) = match self {
            Self::Age => (Op::Replace, "/Age".to_string(), json!(document::age(rng))),
            Self::IsActive => (Op::Replace, "/IsActive".to_string(), json!(rng.random::<bool>())),
            Self::Balance => (Op::Replace, "/Balance".to_string(), json!(document::balance(rng))),
            Self::Email => (Op::Replace, "/Email".to_string(), json!(document::email(rng))),
            Self::Phone => (Op::Replace, "/Phone".to_string(), json!(document::phone(rng))),
            Self::Company => (
                Op::Replace,
                "/Company".to_string(),
                json!(words::pick(rng, &words::COMPANIES)),
            ),
            Self::FirstName => (
                Op::Replace,
                "/Name/First".to_string(),
                json!(words::pick(rng, &words::FIRST_NAMES)),
            ),
            Self::City => (
                Op::Replace,
                "/Address/City".to_string(),
                json!(words::pick(rng, &words::CITIES)),
            ),
            Self::Latitude => (
                Op::Replace,
                "/Address/Coordinates/Latitude".to_string(),
                json!(rng.random_range(-90.0f32..90.0)),
            ),
            Self::FriendAge => (
                Op::Replace,
                format!("/Friends/Friend{}/Age", rng.random_range(1..=10)),
                json!(document::age(rng)),
            ),
            Self::FirstTag => (Op::Replace, "/Tags/0".to_string(), json!(words::word(rng))),
            Self::About => (Op::Replace, "/About".to_string(), json!(words::sentence(rng))),
            Self::Nickname => (Op::Add, "/Nickname".to_string(), json!(words::word(rng))),
            Self::Score => (Op::Add, "/Score".to_string(), json!(rng.random_range(0..1_000))),
            Self::Verified => (Op::Add, "/Verified".to_string(), json!(rng.random::<bool>())),
            Self::Preferences => (
                Op::Add,
                "/Preferences".to_string(),
                json!({
                    "Theme": words::word(rng),
                    "Newsletter": rng.random::<bool>(),
                }),
            ),
            Self::AppendTag => (Op::Add, "/Tags/-".to_string(), json!(words::word(rng))),
        };
        Mutation { op, path, value }
    }
}

/// An unending stream of content mutations for one patch style.
///
/// Each pass over the style's catalog is shuffled independently. The stream
/// owns its RNG and cannot be rewound; start a fresh one per run.
#[derive(Debug)]
pub struct PatchTemplates<R> {
    style: PatchStyle,
    rng: R,
    pending: Vec<Template>,
}

impl<R> PatchTemplates<R>
where
    R: Rng,
{
    /// Create a new [`PatchTemplates`]
    pub fn new(style: PatchStyle, rng: R) -> Self {
        Self {
            style,
            rng,
            pending: Vec::new(),
        }
    }

    fn next_template(&mut self) -> Template {
        loop {
            if let Some(template) = self.pending.pop() {
                return template;
            }
            self.pending.extend_from_slice(Template::catalog(self.style));
            self.pending.shuffle(&mut self.rng);
            trace!(style = %self.style, "reshuffled patch templates");
        }
    }

    /// Draw the next mutation.
    pub fn draw(&mut self) -> Mutation {
        let template = self.next_template();
        template.render(&mut self.rng)
    }
}

impl<R> Iterator for PatchTemplates<R>
where
    R: Rng,
{
    type Item = Mutation;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.draw())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

/// Draw `count` distinct integers uniformly from `[0, limit)`.
///
/// Sparse requests use rejection sampling. Requests for more than half of the
/// range use index sampling, which does not slow down as `count` approaches
/// `limit`.
///
/// # Errors
///
/// Function will error if `limit` is zero or smaller than `count`.
pub fn sample_unique<R>(rng: &mut R, limit: u64, count: usize) -> Result<Vec<u64>, Error>
where
    R: Rng + ?Sized,
{
    let requested = count as u64;
    if limit == 0 || requested > limit {
        return Err(Error::InsufficientIds {
            requested,
            available: limit,
        });
    }

    if requested.saturating_mul(2) <= limit {
        let mut seen = FxHashSet::default();
        seen.reserve(count);
        let mut ids = Vec::with_capacity(count);
        while ids.len() < count {
            let candidate = rng.random_range(0..limit);
            if seen.insert(candidate) {
                ids.push(candidate);
            }
        }
        return Ok(ids);
    }

    let length = usize::try_from(limit).map_err(|_| Error::InsufficientIds {
        requested,
        available: limit,
    })?;
    Ok(rand::seq::index::sample(rng, length, count)
        .into_iter()
        .map(|i| i as u64)
        .collect())
}

/// Assemble `count` patches against distinct existing ids.
///
/// Ids are drawn from `[0, id_space.bound())`; each is paired with the next
/// mutation from `templates` and a timestamp touch.
///
/// # Errors
///
/// Function will error if the id space holds fewer than `count` ids.
pub fn generate_patches<T, R>(
    id_space: &IdSpace,
    templates: &mut PatchTemplates<T>,
    rng: &mut R,
    count: usize,
) -> Result<Vec<Patch>, Error>
where
    T: Rng,
    R: Rng + ?Sized,
{
    let ids = sample_unique(rng, id_space.bound(), count)?;
    Ok(ids
        .into_iter()
        .map(|id| Patch {
            id: format_id(id),
            patch: vec![templates.draw(), Mutation::touch_timestamp()],
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::SmallRng};

    use super::*;

    fn templates(style: PatchStyle, seed: u64) -> PatchTemplates<SmallRng> {
        PatchTemplates::new(style, SmallRng::seed_from_u64(seed))
    }

    #[test]
    fn sample_unique_sparse() {
        let mut rng = SmallRng::seed_from_u64(1);
        let ids = sample_unique(&mut rng, 100, 30).expect("range is large enough");
        assert_eq!(ids.len(), 30);
        assert!(ids.iter().all(|id| *id < 100));
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 30);
    }

    #[test]
    fn sample_unique_dense_and_exhaustive() {
        let mut rng = SmallRng::seed_from_u64(2);
        let ids = sample_unique(&mut rng, 100, 90).expect("range is large enough");
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 90);
        assert!(ids.iter().all(|id| *id < 100));

        let mut all = sample_unique(&mut rng, 10, 10).expect("range is large enough");
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn sample_unique_rejects_impossible_requests() {
        let mut rng = SmallRng::seed_from_u64(3);
        assert!(matches!(
            sample_unique(&mut rng, 0, 1),
            Err(Error::InsufficientIds {
                requested: 1,
                available: 0
            })
        ));
        assert!(sample_unique(&mut rng, 0, 0).is_err());
        assert!(sample_unique(&mut rng, 5, 6).is_err());
    }

    #[test]
    fn every_patch_has_one_content_mutation_and_a_touch() {
        let space = IdSpace::new();
        space.set_bound(1_000);
        let mut rng = SmallRng::seed_from_u64(4);
        for style in [PatchStyle::Replace, PatchStyle::Add] {
            let mut stream = templates(style, 5);
            let patches = generate_patches(&space, &mut stream, &mut rng, 50).expect("bound is set");
            assert_eq!(patches.len(), 50);
            for patch in &patches {
                assert_eq!(patch.patch.len(), 2);
                assert_ne!(patch.patch[0].path, "/_ts");
                let touch = &patch.patch[1];
                assert_eq!(touch.op, Op::Add);
                assert_eq!(touch.path, "/_ts");
                assert!(touch.value.as_i64().is_some_and(|t| t > 0));
                assert_eq!(patch.id.len(), crate::id_space::ID_WIDTH);
            }
            let ids: HashSet<_> = patches.iter().map(|p| p.id.as_str()).collect();
            assert_eq!(ids.len(), 50);
        }
    }

    #[test]
    fn patches_fail_on_empty_id_space() {
        let space = IdSpace::new();
        let mut rng = SmallRng::seed_from_u64(6);
        let mut stream = templates(PatchStyle::Replace, 7);
        assert!(generate_patches(&space, &mut stream, &mut rng, 1).is_err());
    }

    #[test]
    fn patch_serializes_with_id_field() {
        let patch = Patch {
            id: format_id(7),
            patch: vec![Mutation {
                op: Op::Replace,
                path: "/Age".to_string(),
                value: json!(27),
            }],
        };
        let value = serde_json::to_value(&patch).expect("serializes");
        assert_eq!(
            value,
            json!({
                "_id": "000000000000000000000007",
                "patch": [{"op": "replace", "path": "/Age", "value": 27}],
            })
        );
    }

    #[test]
    fn each_pass_covers_catalog_once() {
        for style in [PatchStyle::Replace, PatchStyle::Add] {
            let catalog = Template::catalog(style);
            let mut stream = templates(style, 8);
            let mut orders = Vec::new();
            for _ in 0..5 {
                let pass: Vec<Template> = (0..catalog.len()).map(|_| stream.next_template()).collect();
                let distinct: HashSet<_> = pass.iter().copied().collect();
                assert_eq!(distinct.len(), catalog.len());
                assert!(pass.iter().all(|t| catalog.contains(t)));
                orders.push(pass);
            }
            assert!(orders.windows(2).any(|w| w[0] != w[1]), "{style} never reshuffled");
        }
    }

    #[test]
    fn styles_use_their_own_ops() {
        let replace: Vec<_> = templates(PatchStyle::Replace, 9).take(100).collect();
        assert!(replace.iter().all(|m| m.op == Op::Replace));
        let add: Vec<_> = templates(PatchStyle::Add, 10).take(100).collect();
        assert!(add.iter().all(|m| m.op == Op::Add));
        assert!(add.iter().any(|m| m.path == "/Tags/-"));
    }

    proptest! {
        #[test]
        fn sample_unique_is_distinct_and_bounded(seed: u64, limit in 1..2_000u64, frac in 0.0..=1.0f64) {
            let count = ((limit as f64) * frac) as usize;
            let mut rng = SmallRng::seed_from_u64(seed);
            let ids = sample_unique(&mut rng, limit, count).expect("count never exceeds limit");
            prop_assert_eq!(ids.len(), count);
            prop_assert!(ids.iter().all(|id| *id < limit));
            prop_assert_eq!(ids.iter().collect::<HashSet<_>>().len(), count);
        }
    }
}
