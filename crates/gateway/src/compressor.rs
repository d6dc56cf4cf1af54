//! Prompt compression: fewer tokens, same request.
//!
//! Every level starts by normalising whitespace. `medium` also drops filler
//! words and rewrites wordy phrases. `high` then removes mid-sentence
//! articles and applies contraction and abbreviation tables. Passes run in a
//! fixed order so a later pass never re-expands an earlier one's output.

use regex_lite::Regex;
use std::sync::LazyLock;
use tollgate_config::CompressionLevel;

const FILLER_WORDS: &[&str] = &[
    "very",
    "really",
    "quite",
    "rather",
    "somewhat",
    "fairly",
    "just",
    "actually",
    "basically",
    "literally",
    "honestly",
    "simply",
    "clearly",
    "obviously",
    "essentially",
    "particularly",
];

const PHRASES: &[(&str, &str)] = &[
    ("in order to", "to"),
    ("due to the fact that", "because"),
    ("at this point in time", "now"),
    ("for the purpose of", "to"),
    ("in the event that", "if"),
    ("a large number of", "many"),
    ("a small number of", "few"),
    ("on a regular basis", "regularly"),
    ("in spite of", "despite"),
    ("take into consideration", "consider"),
    ("make a decision", "decide"),
    ("give an answer", "answer"),
    ("have the ability to", "can"),
    ("in the near future", "soon"),
    ("at the present time", "now"),
];

const CONTRACTIONS: &[(&str, &str)] = &[
    ("do not", "don't"),
    ("does not", "doesn't"),
    ("did not", "didn't"),
    ("will not", "won't"),
    ("would not", "wouldn't"),
    ("should not", "shouldn't"),
    ("could not", "couldn't"),
    ("cannot", "can't"),
    ("are not", "aren't"),
    ("is not", "isn't"),
    ("was not", "wasn't"),
    ("were not", "weren't"),
    ("have not", "haven't"),
    ("has not", "hasn't"),
    ("had not", "hadn't"),
    ("I am", "I'm"),
    ("you are", "you're"),
    ("he is", "he's"),
    ("she is", "she's"),
    ("it is", "it's"),
    ("we are", "we're"),
    ("they are", "they're"),
    ("I have", "I've"),
    ("you have", "you've"),
    ("we have", "we've"),
    ("they have", "they've"),
    ("I will", "I'll"),
    ("you will", "you'll"),
    ("he will", "he'll"),
    ("she will", "she'll"),
    ("we will", "we'll"),
    ("they will", "they'll"),
    ("I would", "I'd"),
    ("you would", "you'd"),
    ("he would", "he'd"),
    ("she would", "she'd"),
    ("we would", "we'd"),
    ("they would", "they'd"),
];

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("approximately", "approx"),
    ("regarding", "re"),
    ("information", "info"),
    ("example", "e.g."),
    ("because", "bc"),
    ("without", "w/o"),
    ("with", "w/"),
    ("between", "btw"),
    ("through", "thru"),
    ("number", "no."),
    ("versus", "vs"),
];

type Rule = (Regex, &'static str);

struct Rules {
    normalize: Vec<Rule>,
    collapse: Vec<Rule>,
    fillers: Vec<Rule>,
    phrases: Vec<Rule>,
    articles: Vec<Rule>,
    contractions: Vec<Rule>,
    abbreviations: Vec<Rule>,
}

fn compile(patterns: impl IntoIterator<Item = (String, &'static str)>) -> Vec<Rule> {
    patterns
        .into_iter()
        .filter_map(|(pattern, replacement)| Regex::new(&pattern).ok().map(|re| (re, replacement)))
        .collect()
}

fn whole_words(table: &'static [(&'static str, &'static str)]) -> Vec<Rule> {
    compile(
        table
            .iter()
            .map(|(from, to)| (format!(r"(?i)\b{}\b", regex_lite::escape(from)), *to)),
    )
}

static RULES: LazyLock<Rules> = LazyLock::new(|| Rules {
    normalize: compile([
        (r"[^\S\n]+".to_string(), " "),
        (r"\n\s*\n+".to_string(), "\n"),
    ]),
    collapse: compile([(r"\s+".to_string(), " ")]),
    fillers: compile([(format!(r"(?i)\b({})\b", FILLER_WORDS.join("|")), "")]),
    phrases: whole_words(PHRASES),
    articles: compile([(r"(?i)\s+(a|an|the)\s+".to_string(), " ")]),
    contractions: whole_words(CONTRACTIONS),
    abbreviations: whole_words(ABBREVIATIONS),
});

fn apply(text: String, rules: &[Rule]) -> String {
    rules.iter().fold(text, |acc, (re, replacement)| {
        re.replace_all(&acc, *replacement).into_owned()
    })
}

fn collapse(text: String) -> String {
    apply(text, &RULES.collapse).trim().to_string()
}

/// Compress `text` at `level`. Pure and deterministic.
pub fn compress(text: &str, level: CompressionLevel) -> String {
    let rules = &*RULES;

    let mut out = apply(text.to_string(), &rules.normalize).trim().to_string();
    if level == CompressionLevel::Low {
        return out;
    }

    out = collapse(apply(out, &rules.fillers));
    out = collapse(apply(out, &rules.phrases));
    if level == CompressionLevel::Medium {
        return out;
    }

    out = collapse(apply(out, &rules.articles));
    out = apply(out, &rules.contractions);
    apply(out, &rules.abbreviations)
}

/// Fraction of characters removed, clamped to `[0, 1]`.
pub fn compression_ratio(original: &str, compressed: &str) -> f64 {
    let before = original.chars().count();
    if before == 0 {
        return 0.0;
    }
    let after = compressed.chars().count();
    ((before as f64 - after as f64) / before as f64).clamp(0.0, 1.0)
}
