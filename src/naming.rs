//! Human-readable index identifiers.
//!
//! Every ingestion gets a fresh `adjective-name` identifier such as `brave-falcon`. The
//! vocabulary is fixed, so uniqueness is probabilistic only; collisions are not checked.

use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "able", "agile", "amber", "ancient", "arctic", "azure", "bold", "brave", "breezy", "bright",
    "brisk", "calm", "candid", "clever", "cosmic", "crimson", "crisp", "curious", "daring",
    "dazzling", "eager", "early", "earnest", "electric", "elegant", "emerald", "epic", "fair",
    "fearless", "fierce", "fluffy", "fond", "frosty", "gentle", "gifted", "glad", "golden",
    "graceful", "grand", "happy", "hardy", "hidden", "honest", "humble", "icy", "jolly", "jovial",
    "keen", "kind", "lively", "loyal", "lucky", "lunar", "majestic", "mellow", "merry", "mighty",
    "misty", "modest", "noble", "nimble", "odd", "patient", "peaceful", "plucky", "polite",
    "proud", "quick", "quiet", "radiant", "rapid", "rare", "rustic", "scarlet", "serene", "sharp",
    "shiny", "silent", "silver", "sleek", "smooth", "snowy", "solar", "sparkling", "spry",
    "steady", "stellar", "stormy", "sunny", "swift", "tidy", "tranquil", "trusty", "vast",
    "velvet", "vivid", "wandering", "warm", "wise", "witty", "zealous",
];

const NAMES: &[&str] = &[
    "ada", "albatross", "alice", "badger", "beacon", "bear", "bison", "blaise", "boris", "brook",
    "canyon", "carl", "cedar", "clara", "comet", "condor", "coral", "cougar", "crane", "daisy",
    "delta", "dolphin", "eagle", "edith", "elk", "ember", "falcon", "fern", "finch", "fox",
    "gauss", "glacier", "grace", "grover", "harbor", "hazel", "heron", "hopper", "ibis", "iris",
    "jaguar", "jasper", "juniper", "kepler", "kestrel", "koala", "lark", "leo", "linnea", "lotus",
    "lynx", "maple", "marie", "meadow", "mercury", "mesa", "moose", "nova", "oak", "orca",
    "osprey", "otter", "panda", "pascal", "pebble", "pine", "puffin", "quartz", "raven", "reef",
    "river", "robin", "rowan", "sage", "salmon", "sequoia", "sparrow", "spruce", "summit", "swan",
    "thistle", "tiger", "tundra", "turing", "uma", "valley", "vega", "violet", "walrus", "willow",
    "wolf", "wren", "yak", "yara", "zebra", "zephyr",
];

/// Generates lowercase `adjective-name` identifiers for new indexes.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexNameGenerator;

impl IndexNameGenerator {
    /// Create a generator backed by the built-in vocabulary.
    pub const fn new() -> Self {
        Self
    }

    /// Draw a new identifier using the thread-local RNG.
    pub fn generate(&self) -> String {
        self.generate_with(&mut rand::thread_rng())
    }

    /// Draw a new identifier from the supplied RNG.
    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
        let name = NAMES[rng.gen_range(0..NAMES.len())];
        format!("{adjective}-{name}")
    }

    /// Number of distinct identifiers the generator can produce.
    pub fn vocabulary_size(&self) -> usize {
        ADJECTIVES.len() * NAMES.len()
    }
}
