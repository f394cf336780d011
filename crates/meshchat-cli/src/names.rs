//! Random channel codes and codenames.

use meshchat_core::Environment;
use meshchat_proto::{ChannelId, ProtocolError};

const CODE_WORDS: usize = 4;

const WORDS: [&str; 64] = [
    "amber", "arch", "bark", "bold", "brook", "calm", "cedar", "clay", "cliff", "cloud", "coral",
    "cove", "crisp", "dawn", "deep", "dune", "dusk", "echo", "ember", "fern", "field", "flint",
    "frost", "glade", "gold", "grid", "grove", "hazel", "heath", "iris", "ivory", "jade", "lark",
    "leaf", "lime", "marsh", "mild", "mist", "moss", "night", "oak", "opal", "pale", "peak",
    "pine", "plum", "quartz", "rain", "reed", "ridge", "root", "sage", "sand", "slate", "snow",
    "stone", "thorn", "tidy", "vast", "vale", "wave", "wind", "wren", "zinc",
];

const ADJECTIVES: [&str; 16] = [
    "Amber", "Brisk", "Calm", "Dusky", "Gentle", "Hidden", "Lucky", "Misty", "Nimble", "Quiet",
    "Rapid", "Silver", "Slate", "Steady", "Swift", "Wild",
];

const ANIMALS: [&str; 16] = [
    "Badger", "Crane", "Falcon", "Fox", "Hare", "Heron", "Lynx", "Marten", "Moth", "Otter", "Owl",
    "Raven", "Seal", "Stoat", "Wolf", "Wren",
];

/// Fresh four-word channel code.
pub fn channel_id<E: Environment>(env: &E) -> Result<ChannelId, ProtocolError> {
    let words: Vec<&str> = (0..CODE_WORDS).map(|_| pick(env, &WORDS)).collect();
    ChannelId::parse(&words.join("-"))
}

/// Fresh two-word display codename.
pub fn codename<E: Environment>(env: &E) -> String {
    format!("{} {}", pick(env, &ADJECTIVES), pick(env, &ANIMALS))
}

fn pick<'a, E: Environment>(env: &E, list: &[&'a str]) -> &'a str {
    list[(env.random_u64() % list.len() as u64) as usize]
}
