//! Shared scripts, narration and payloads for integration tests

#![allow(dead_code)]

use story_reel::models::media::NarrationText;
use story_reel::models::script::{SceneDirective, Script};

/// Named scene script used across tests
#[derive(Debug, Clone)]
pub struct ScriptFixture {
    pub name: &'static str,
    pub directives: &'static [(u64, &'static str, Option<&'static str>)],
    pub description: &'static str,
}

pub const SCRIPT_FIXTURES: &[ScriptFixture] = &[
    ScriptFixture {
        name: "cat_window",
        directives: &[
            (0, "start", Some("A cat sitting on a windowsill")),
            (3000, "interact", Some("The cat watches a bird outside")),
            (6000, "end", None),
        ],
        description: "Three directives, the smallest useful script",
    },
    ScriptFixture {
        name: "goat_and_tricksters",
        directives: &[
            (0, "start", Some("Ancient Indian village market. A humble villager buys a healthy white goat and carries it proudly on his shoulders.")),
            (3500, "interact", Some("A cunning man approaches, laughing and saying the villager is carrying a dog, not a goat.")),
            (7000, "interact", Some("Another man mocks the villager, loudly insisting that the animal is clearly a dog.")),
            (10500, "interact", Some("A third trickster shames the villager publicly, making him doubt himself.")),
            (14000, "interact", Some("Confused, embarrassed, and afraid, the villager drops the goat and runs away.")),
            (17500, "interact", Some("The three tricksters burst into laughter, pointing and celebrating their success.")),
            (21000, "interact", Some("That evening the tricksters sit around a fire, roasting the goat and enjoying a feast.")),
            (25000, "end", None),
        ],
        description: "Eight directives at 3.5 s spacing",
    },
];

impl ScriptFixture {
    pub fn script(&self) -> Script {
        let directives = self
            .directives
            .iter()
            .map(|(ts, kind, prompt)| match *kind {
                "start" => SceneDirective::start(*ts, prompt.unwrap_or_default()),
                "interact" => SceneDirective::interact(*ts, prompt.unwrap_or_default()),
                _ => SceneDirective::end(*ts),
            })
            .collect();
        Script::new(directives).expect("fixture scripts are valid")
    }
}

pub fn three_scene_script() -> Script {
    SCRIPT_FIXTURES[0].script()
}

pub fn narration() -> NarrationText {
    NarrationText::new(
        "In an old village, a man bought a goat and carried it home proudly. \
         On the road, a stranger laughed and said, 'Why are you carrying a dog?'",
    )
}

/// Deterministic fake video payload of `len` bytes.
pub fn video_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
