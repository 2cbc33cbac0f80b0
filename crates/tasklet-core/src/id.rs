use chrono::Utc;
use rand::rngs::{OsRng, SmallRng};
use rand::{Rng, RngCore, SeedableRng};
use tracing::warn;
use uuid::Builder;

/// Task id source. Random v4 UUIDs from the OS generator; once that fails,
/// `<epoch-millis>-<hex>` ids from a seeded generator for the rest of the
/// process.
#[derive(Debug)]
pub struct IdGenerator {
    fallback: Option<SmallRng>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { fallback: None }
    }

    pub fn fallback(seed: u64) -> Self {
        Self {
            fallback: Some(SmallRng::seed_from_u64(seed)),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn new_id(&mut self) -> String {
        if self.fallback.is_none() {
            let mut bytes = [0u8; 16];
            match OsRng.try_fill_bytes(&mut bytes) {
                Ok(()) => return Builder::from_random_bytes(bytes).into_uuid().to_string(),
                Err(err) => {
                    warn!(error = %err, "secure random source unavailable; using timestamp ids");
                    self.fallback = Some(SmallRng::seed_from_u64(clock_seed()));
                }
            }
        }

        let rng = self.fallback.get_or_insert_with(|| SmallRng::seed_from_u64(clock_seed()));
        format!("{}-{:x}", Utc::now().timestamp_millis(), rng.r#gen::<u64>())
    }
}

fn clock_seed() -> u64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .map(|nanos| nanos as u64)
        .unwrap_or_else(|| now.timestamp_millis() as u64)
}
