//! Synthetic documents.
//!
//! Every document is a JSON object built from a fixed record shape sized to
//! look like a realistic multi-kilobyte user profile. The content is not
//! meaningful, only its size and type variety matter. Onto the record the
//! [`Generator`] stamps the bookkeeping fields the latency probe and the
//! patch assembler rely on: `_id`, `_event_time`, `_ts`,
//! `generator_identifier` and, when clustering, [`crate::cluster::FIELD`].

use std::sync::Arc;

use rand::{Rng, distr::StandardUniform, prelude::Distribution};
use serde::{Serialize, ser::SerializeMap};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    Error, IdMode, RunMode, Spec, cluster,
    id_space::{IdSpace, format_id},
    random_identifier, words,
};

/// A generated document, an open map from field name to value.
pub type Document = serde_json::Map<String, Value>;

/// Document id field.
pub const ID_FIELD: &str = "_id";
/// Event time field, set once at write time.
pub const EVENT_TIME_FIELD: &str = "_event_time";
/// Timestamp field, refreshed by every patch.
pub const TS_FIELD: &str = "_ts";
/// Run tag field.
pub const GENERATOR_IDENTIFIER_FIELD: &str = "generator_identifier";

// Registration timestamps fall between 2000-01-01 and 2025-01-01.
const REGISTERED_RANGE: std::ops::Range<i64> = 946_684_800..1_735_689_600;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Name {
    first: &'static str,
    last: &'static str,
}

impl Distribution<Name> for StandardUniform {
    fn sample<R>(&self, rng: &mut R) -> Name
    where
        R: Rng + ?Sized,
    {
        Name {
            first: words::pick(rng, &words::FIRST_NAMES),
            last: words::pick(rng, &words::LAST_NAMES),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Coordinates {
    latitude: f32,
    longitude: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Address {
    street: &'static str,
    city: &'static str,
    zip_code: i16,
    coordinates: Coordinates,
}

impl Distribution<Address> for StandardUniform {
    fn sample<R>(&self, rng: &mut R) -> Address
    where
        R: Rng + ?Sized,
    {
        Address {
            street: words::pick(rng, &words::STREETS),
            city: words::pick(rng, &words::CITIES),
            zip_code: rng.random(),
            coordinates: Coordinates {
                latitude: rng.random_range(-90.0..90.0),
                longitude: rng.random_range(-180.0..180.0),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Friend {
    name: Name,
    age: i64,
}

/// Ten friends, serialized as `Friend1` through `Friend10`.
#[derive(Debug)]
struct Friends([Friend; 10]);

impl Serialize for Friends {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (i, friend) in self.0.iter().enumerate() {
            map.serialize_entry(&format!("Friend{}", i + 1), friend)?;
        }
        map.end()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Record {
    guid: String,
    is_active: bool,
    balance: f64,
    picture: String,
    age: i64,
    name: Name,
    company: &'static str,
    email: String,
    phone: String,
    address: Address,
    about: String,
    registered: String,
    tags: Vec<&'static str>,
    friends: Friends,
    greeting: String,
}

pub(crate) fn age<R>(rng: &mut R) -> i64
where
    R: Rng + ?Sized,
{
    words::AGES[rng.random_range(0..words::AGES.len())]
}

pub(crate) fn balance<R>(rng: &mut R) -> f64
where
    R: Rng + ?Sized,
{
    f64::from(rng.random_range(0..10_000_000u32)) / 100.0
}

pub(crate) fn email<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    format!(
        "{}.{}@{}",
        words::pick(rng, &words::FIRST_NAMES).to_lowercase(),
        words::pick(rng, &words::LAST_NAMES).to_lowercase(),
        words::pick(rng, &words::DOMAINS)
    )
}

pub(crate) fn phone<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    format!(
        "{:03}-{:03}-{:04}",
        rng.random_range(200..1000),
        rng.random_range(0..1000),
        rng.random_range(0..10_000)
    )
}

pub(crate) fn guid<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    uuid::Builder::from_random_bytes(rng.random())
        .into_uuid()
        .to_string()
}

fn registered<R>(rng: &mut R) -> Result<String, Error>
where
    R: Rng + ?Sized,
{
    let at = OffsetDateTime::from_unix_timestamp(rng.random_range(REGISTERED_RANGE))?;
    Ok(at.format(&Rfc3339)?)
}

fn record<R>(rng: &mut R) -> Result<Record, Error>
where
    R: Rng + ?Sized,
{
    let tag_count = rng.random_range(1..8);
    Ok(Record {
        guid: guid(rng),
        is_active: rng.random(),
        balance: balance(rng),
        picture: format!("https://pictures.test/{}", random_identifier(rng, 16)),
        age: age(rng),
        name: rng.random(),
        company: words::pick(rng, &words::COMPANIES),
        email: email(rng),
        phone: phone(rng),
        address: rng.random(),
        about: words::sentence(rng),
        registered: registered(rng)?,
        tags: (0..tag_count).map(|_| words::word(rng)).collect(),
        friends: Friends(std::array::from_fn(|_| Friend {
            name: rng.random(),
            age: age(rng),
        })),
        greeting: words::paragraph(rng),
    })
}

/// Builds documents for one run.
///
/// The generator holds the run's [`Spec`] and a shared handle on the run's
/// [`IdSpace`]. It is cheap to clone and safe to use from many tasks.
#[derive(Debug, Clone)]
pub struct Generator {
    spec: Spec,
    id_space: Arc<IdSpace>,
}

impl Generator {
    /// Create a new [`Generator`]
    #[must_use]
    pub fn new(spec: Spec, id_space: Arc<IdSpace>) -> Self {
        Self { spec, id_space }
    }

    /// The spec this generator builds documents for.
    #[must_use]
    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// The id space shared with this generator.
    #[must_use]
    pub fn id_space(&self) -> &Arc<IdSpace> {
        &self.id_space
    }

    /// Generate a single document.
    ///
    /// # Errors
    ///
    /// Function will error if the synthetic record cannot be built or
    /// converted into a JSON object.
    pub fn generate<R>(&self, rng: &mut R) -> Result<Document, Error>
    where
        R: Rng + ?Sized,
    {
        let Value::Object(mut doc) = serde_json::to_value(record(rng)?)? else {
            return Err(Error::NotAnObject);
        };

        if self.spec.assign_ids {
            let id = match (self.spec.run_mode, self.spec.id_mode) {
                (RunMode::Mixed, _) => {
                    let (id, _inserted) = self
                        .id_space
                        .mixed_mode_id(rng, self.spec.update_percentage);
                    format_id(id)
                }
                (_, IdMode::Sequential) => self.id_space.next_sequential_id(),
                (_, IdMode::Uuid) => guid(rng),
            };
            doc.insert(ID_FIELD.to_string(), Value::String(id));
        }

        if let Some(key) = cluster::key(
            rng,
            self.spec.num_clusters,
            self.spec.hot_cluster_percentage,
        ) {
            doc.insert(cluster::FIELD.to_string(), Value::from(key));
        }

        let now = crate::now_micros();
        doc.insert(EVENT_TIME_FIELD.to_string(), Value::from(now));
        doc.insert(TS_FIELD.to_string(), Value::from(now));
        doc.insert(
            GENERATOR_IDENTIFIER_FIELD.to_string(),
            Value::String(self.spec.generator_identifier.clone()),
        );

        Ok(doc)
    }

    /// Generate `batch_size` documents.
    ///
    /// # Errors
    ///
    /// Function will error on the first failed generation, no partial batch
    /// is returned.
    pub fn generate_batch<R>(&self, rng: &mut R, batch_size: usize) -> Result<Vec<Document>, Error>
    where
        R: Rng + ?Sized,
    {
        (0..batch_size).map(|_| self.generate(rng)).collect()
    }
}
