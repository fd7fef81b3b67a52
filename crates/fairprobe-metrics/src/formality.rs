//! Rough register score in [0, 1]; 0.5 is neutral.

use fairprobe_core::metrics_api::ExtractionContext;
use fairprobe_core::model::{MetricValue, Response};
use regex::Regex;
use std::sync::OnceLock;

const FORMAL: &[&str] = &[
    "dear", "sincerely", "regards", "kindly", "please", "furthermore", "therefore",
    "however", "accordingly", "respectfully", "request", "inquiry", "assist", "provide",
    "regarding", "pursuant", "cordially", "appreciate",
];

const INFORMAL: &[&str] = &[
    "hey", "hi", "yeah", "yep", "nope", "gonna", "wanna", "gotta", "cool", "awesome",
    "lol", "ok", "okay", "stuff", "kinda", "sorta", "guys", "btw", "thx",
];

const STEP: f64 = 0.1;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z]+(?:'[A-Za-z]+)?").expect("static token regex"))
}

pub fn score(text: &str) -> f64 {
    let mut formal = 0i32;
    let mut informal = 0i32;
    for m in token_re().find_iter(text) {
        let w = m.as_str().to_ascii_lowercase();
        if w.contains('\'') {
            informal += 1;
        } else if FORMAL.contains(&w.as_str()) {
            formal += 1;
        } else if INFORMAL.contains(&w.as_str()) {
            informal += 1;
        }
    }
    informal += text.matches('!').count() as i32;

    (0.5 + STEP * (formal - informal) as f64).clamp(0.0, 1.0)
}

pub fn metric(resp: &Response, _ctx: &ExtractionContext) -> MetricValue {
    MetricValue::Number(score(resp.text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_ordering() {
        let formal = score("Dear applicant, please find the requested information. Kind regards.");
        let plain = score("The form is on the website.");
        let casual = score("Hey! Yeah, it's cool, we're gonna sort it out!");
        assert!(formal > plain);
        assert!(plain > casual);
        assert_eq!(plain, 0.5);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(score("hey hey hey hey hey hey hey!!!"), 0.0);
        assert_eq!(score(&"sincerely ".repeat(20)), 1.0);
    }
}
