//! Invocation shape registry
//!
//! The caller only ever produces a handful of exact argv shapes. Each shape
//! is a fixed-length list of tokens that either must equal a literal or are
//! captured into a named slot. Classification walks the registry in order
//! and takes the first shape that matches; anything else is unrecognized.

use std::collections::HashMap;

/// One position in an invocation shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// The argument must equal this string
    Literal(&'static str),
    /// Any argument, stored under this slot name
    Capture(&'static str),
}

use Token::{Capture, Literal};

const IMAGE: &str = "image";
const ENV_FILE: &str = "env_file";
const VOLUME: &str = "volume";

/// Which command a shape maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Pull,
    Inspect,
    Run,
}

/// A declarative argv pattern, matched without the program name
#[derive(Debug)]
struct Shape {
    kind: Kind,
    tokens: &'static [Token],
}

const RUN_WITHOUT_VOLUME: [Token; 12] = [
    Literal("run"),
    Literal("--quiet"),
    Literal("--rm"),
    Literal("--restart"),
    Literal("on-failure"),
    Literal("--pull"),
    Literal("never"),
    Literal("--env-file"),
    Capture(ENV_FILE),
    Literal("--network"),
    Literal("host"),
    Capture(IMAGE),
];

const RUN_WITH_VOLUME: [Token; 14] = [
    Literal("run"),
    Literal("--quiet"),
    Literal("--rm"),
    Literal("--restart"),
    Literal("on-failure"),
    Literal("--pull"),
    Literal("never"),
    Literal("--env-file"),
    Capture(ENV_FILE),
    Literal("--network"),
    Literal("host"),
    Literal("-v"),
    Capture(VOLUME),
    Capture(IMAGE),
];

static SHAPES: &[Shape] = &[
    Shape {
        kind: Kind::Pull,
        tokens: &[Literal("pull"), Capture(IMAGE)],
    },
    Shape {
        kind: Kind::Inspect,
        tokens: &[Literal("image"), Literal("inspect"), Capture(IMAGE)],
    },
    Shape {
        kind: Kind::Run,
        tokens: &RUN_WITHOUT_VOLUME,
    },
    Shape {
        kind: Kind::Run,
        tokens: &RUN_WITH_VOLUME,
    },
];

impl Shape {
    /// Captured slots if `args` matches this shape exactly
    fn captures<'a>(&self, args: &'a [String]) -> Option<HashMap<&'static str, &'a str>> {
        if args.len() != self.tokens.len() {
            return None;
        }

        let mut slots = HashMap::new();
        for (token, arg) in self.tokens.iter().zip(args) {
            match token {
                Literal(expected) if arg == expected => {}
                Literal(_) => return None,
                Capture(slot) => {
                    slots.insert(*slot, arg.as_str());
                }
            }
        }
        Some(slots)
    }
}

/// Arguments of a recognized `run` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Path passed with `--env-file`
    pub env_file: String,
    /// The `src:dest` token passed with `-v`, if any
    pub volume: Option<String>,
    /// Image reference, possibly with a `docker://` scheme
    pub image: String,
}

/// Classified invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `pull <image>`
    Pull {
        /// Requested image
        image: String,
    },
    /// `image inspect <image>`
    Inspect {
        /// Inspected image
        image: String,
    },
    /// `run ... <image>`
    Run(RunArgs),
    /// Anything else
    Unrecognized,
}

/// Classify `args` (argv without the program name)
pub fn classify(args: &[String]) -> Command {
    for shape in SHAPES {
        let Some(slots) = shape.captures(args) else {
            continue;
        };
        let slot = |name: &str| slots.get(name).map(|s| s.to_string()).unwrap_or_default();

        return match shape.kind {
            Kind::Pull => Command::Pull { image: slot(IMAGE) },
            Kind::Inspect => Command::Inspect { image: slot(IMAGE) },
            Kind::Run => Command::Run(RunArgs {
                env_file: slot(ENV_FILE),
                volume: slots.get(VOLUME).map(|s| s.to_string()),
                image: slot(IMAGE),
            }),
        };
    }

    Command::Unrecognized
}
