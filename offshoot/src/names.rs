//! Short memorable labels for concurrent tasks.
//!
//! Produces names like "brisk-otter-3f2a": short enough to fit a thread
//! name, distinct enough to follow one task through the logs.

use rand::prelude::IndexedRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "amber", "brisk", "calm", "dusty", "eager", "fuzzy", "gentle", "hasty",
    "icy", "jolly", "keen", "lucky", "mellow", "nimble", "odd", "plucky",
    "quiet", "rusty", "sly", "tidy", "upbeat", "vivid", "wry", "zesty",
];

const ANIMALS: &[&str] = &[
    "otter", "heron", "lynx", "badger", "wren", "newt", "ibex", "koi",
    "marten", "gecko", "stoat", "crane", "vole", "tapir", "finch", "moth",
];

/// Generate a task label.
pub fn generate_name() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&"spare");
    let animal = ANIMALS.choose(&mut rng).unwrap_or(&"task");
    let tag: u16 = rng.random();
    format!("{adjective}-{animal}-{tag:04x}")
}
