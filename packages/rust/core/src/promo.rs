//! Promotional item matching and link injection.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use postforge_shared::{MatchScore, PromotionalItem};

/// Points per whole-word keyword hit.
const WHOLE_WORD_POINTS: u32 = 50;
/// Points per hit that only matches inside a longer word.
const SUBSTRING_POINTS: u32 = 10;
const MAX_SCORE: u32 = 100;

/// Generic placeholder a model may emit: `[label](AFFILIATE_LINK_PLACEHOLDER)`.
static LABELLED_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[([^\]]+)\]\(AFFILIATE_LINK_PLACEHOLDER\)").expect("valid regex")
});

/// Named placeholder: `[AFFILIATE_LINK_PLACEHOLDER_<item name>]`.
static NAMED_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[AFFILIATE_LINK_PLACEHOLDER_([^\]]+)\]").expect("valid regex")
});

/// Spans that must not be rewritten: inline links and bare URLs.
static PROTECTED_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!?\[[^\]]*\]\([^)]*\)|<?https?://[^\s)>]+>?").expect("valid regex")
});

/// Case-insensitive whole-word pattern for `term`. Word boundaries are only
/// required at edges where `term` itself has a word character.
fn whole_word(term: &str) -> Option<Regex> {
    let starts_word = term.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_');
    let ends_word = term.chars().last().is_some_and(|c| c.is_alphanumeric() || c == '_');
    let pattern = format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(term),
        if ends_word { r"\b" } else { "" },
    );
    RegexBuilder::new(&pattern).case_insensitive(true).build().ok()
}

/// Score of one item against an already lowercased search text, in `0..=100`.
fn score_item(search_text: &str, item: &PromotionalItem) -> u32 {
    let mut score = 0u32;
    for keyword in &item.keywords {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            continue;
        }
        let exact = whole_word(&keyword).map_or(0, |re| re.find_iter(search_text).count());
        let partial = search_text.matches(keyword.as_str()).count();
        let exact = exact.min(partial) as u32;
        let partial = partial as u32;
        score = score
            .saturating_add(exact * WHOLE_WORD_POINTS)
            .saturating_add((partial - exact) * SUBSTRING_POINTS);
    }
    score.min(MAX_SCORE)
}

/// Rank catalog items against generated content.
///
/// Title and tags are counted twice in the search text. Items scoring below
/// `min_score` are dropped; ties keep catalog order.
pub fn match_items(
    title: &str,
    content: &str,
    tags: &[String],
    catalog: &[PromotionalItem],
    min_score: u32,
    max_results: usize,
) -> Vec<MatchScore> {
    let tags = tags.join(" ");
    let search_text = format!("{title} {title} {tags} {tags} {content}").to_lowercase();

    let mut scores: Vec<MatchScore> = catalog
        .iter()
        .map(|item| MatchScore {
            item_id: item.id.clone(),
            score: score_item(&search_text, item),
        })
        .filter(|m| m.score >= min_score)
        .collect();

    // Stable sort: equal scores stay in catalog order
    scores.sort_by(|a, b| b.score.cmp(&a.score));
    scores.truncate(max_results);

    debug!(
        candidates = catalog.len(),
        matched = scores.len(),
        "promotional items scored"
    );
    scores
}

/// Resolve scores back to catalog entries, in score order.
pub fn matched_items<'a>(
    catalog: &'a [PromotionalItem],
    scores: &[MatchScore],
) -> Vec<&'a PromotionalItem> {
    scores
        .iter()
        .filter_map(|s| catalog.iter().find(|item| item.id == s.item_id))
        .collect()
}

/// Markdown link target for `url`, used to detect an existing link.
fn link_target(url: &str) -> String {
    format!("]({url})")
}

/// Rewrite `content` to link the matched items and carry one disclosure.
///
/// Placeholders are replaced first. Each item whose link is not already in
/// the content then gets its first bare name mention turned into a link.
/// Mentions inside existing links, bare URLs and the disclosure are left
/// alone. Applying this twice gives the same result as applying it once.
pub fn inject(content: &str, items: &[&PromotionalItem], disclosure: &str) -> String {
    if items.is_empty() {
        return content.to_string();
    }

    // Generic placeholders take the items in turn
    let mut next = 0usize;
    let mut out = LABELLED_PLACEHOLDER
        .replace_all(content, |caps: &regex::Captures<'_>| {
            let item = items[next % items.len()];
            next += 1;
            format!("[{}]({})", &caps[1], item.target_url)
        })
        .into_owned();

    out = NAMED_PLACEHOLDER
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            let name = caps[1].trim();
            match items.iter().find(|i| i.name.eq_ignore_ascii_case(name)) {
                Some(item) => format!("[{}]({})", item.name, item.target_url),
                None => name.to_string(),
            }
        })
        .into_owned();

    // Only the body before an existing disclosure is linked
    let disclosure = disclosure.trim();
    let split = match disclosure {
        "" => None,
        d => out.rfind(d),
    };
    let (mut body, tail) = match split {
        Some(at) => (out[..at].to_string(), out[at..].to_string()),
        None => (out, String::new()),
    };

    for item in items {
        if body.contains(&link_target(&item.target_url)) {
            continue;
        }
        if let Some(linked) = link_first_mention(&body, item) {
            body = linked;
        }
    }

    if split.is_some() {
        body.push_str(&tail);
        body
    } else if disclosure.is_empty() {
        body
    } else {
        format!("{}\n\n---\n\n{disclosure}\n", body.trim_end())
    }
}

/// Link the first mention of the item's name outside any link or URL.
fn link_first_mention(content: &str, item: &PromotionalItem) -> Option<String> {
    let name = item.name.trim();
    if name.is_empty() {
        return None;
    }
    let re = whole_word(name)?;
    let protected: Vec<(usize, usize)> = PROTECTED_SPAN
        .find_iter(content)
        .map(|span| (span.start(), span.end()))
        .collect();
    let m = re.find_iter(content).find(|m| {
        let inside = protected
            .iter()
            .any(|&(start, end)| m.start() < end && m.end() > start);
        let before = content[..m.start()].chars().next_back();
        let after = content[m.end()..].chars().next();
        !inside && before != Some('[') && after != Some(']')
    })?;

    Some(format!(
        "{}[{}]({}){}",
        &content[..m.start()],
        m.as_str(),
        item.target_url,
        &content[m.end()..]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISCLOSURE: &str = "*This post contains affiliate links.*";

    fn item(id: &str, name: &str, keywords: &[&str]) -> PromotionalItem {
        PromotionalItem {
            id: id.into(),
            name: name.into(),
            target_url: format!("https://shop.example/{id}"),
            category: "gear".into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn repeated_keyword_hits_cap_at_100() {
        let catalog = vec![item("p1", "Gram 14", &["laptop", "notebook"])];
        let scores = match_items(
            "My desk setup",
            "I use a laptop daily. The laptop sits next to a notebook.",
            &[],
            &catalog,
            20,
            2,
        );
        assert_eq!(scores, vec![MatchScore { item_id: "p1".into(), score: 100 }]);
    }

    #[test]
    fn title_and_tags_weigh_double() {
        let catalog = vec![item("shoes", "Road Shoe", &["shoes"])];
        let from_title = match_items("Running shoes review", "", &[], &catalog, 0, 5);
        let from_body = match_items("Review", "new shoes", &[], &catalog, 0, 5);
        let from_tag = match_items("Review", "", &["shoes".into()], &catalog, 0, 5);
        assert_eq!(from_title[0].score, 100);
        assert_eq!(from_tag[0].score, 100);
        assert_eq!(from_body[0].score, 50);
    }

    #[test]
    fn substring_hits_score_lower() {
        let catalog = vec![item("run", "Run Club", &["run"])];
        let scores = match_items("", "I went running", &[], &catalog, 0, 5);
        assert_eq!(scores[0].score, 10);
    }

    #[test]
    fn threshold_order_and_limit() {
        let catalog = vec![
            item("a", "A", &["watch"]),
            item("b", "B", &["watches"]),
            item("c", "C", &["watch"]),
            item("d", "D", &["unrelated"]),
        ];
        let scores = match_items("", "a watch and more watches", &[], &catalog, 20, 2);
        let ids: Vec<_> = scores.iter().map(|s| s.item_id.as_str()).collect();
        // a and c tie; catalog order is kept
        assert_eq!(ids, vec!["a", "c"]);
        assert!(scores.iter().all(|s| s.score >= 20));
    }

    #[test]
    fn hangul_keywords_match() {
        let catalog = vec![item("k", "그램", &["노트북"])];
        let scores = match_items("노트북 추천", "", &[], &catalog, 20, 2);
        assert_eq!(scores[0].score, 100);
    }

    #[test]
    fn placeholders_are_replaced() {
        let laptop = item("p1", "Gram 14", &["laptop"]);
        let content = "Get the [best laptop](AFFILIATE_LINK_PLACEHOLDER) today.\n\
                       Also see [AFFILIATE_LINK_PLACEHOLDER_Gram 14] and [AFFILIATE_LINK_PLACEHOLDER_Other].";
        let out = inject(content, &[&laptop], DISCLOSURE);
        assert!(out.contains("[best laptop](https://shop.example/p1)"));
        assert!(out.contains("[Gram 14](https://shop.example/p1)"));
        assert!(out.contains("and Other."));
        assert!(!out.contains("PLACEHOLDER"));
    }

    #[test]
    fn first_bare_mention_is_linked_once() {
        let laptop = item("p1", "Gram 14", &["laptop"]);
        let content = "The gram 14 is light. I carry the Gram 14 everywhere.";
        let out = inject(content, &[&laptop], DISCLOSURE);
        assert!(out.starts_with("The [gram 14](https://shop.example/p1) is light."));
        assert_eq!(out.matches("https://shop.example/p1").count(), 1);
        assert!(out.contains("carry the Gram 14 everywhere"));
    }

    #[test]
    fn inject_is_idempotent() {
        let laptop = item("p1", "Gram 14", &["laptop"]);
        let watch = item("p2", "Watch SE", &["watch"]);
        let items = [&laptop, &watch];
        let content = "Review of the Gram 14 and the Watch SE.";

        let once = inject(content, &items, DISCLOSURE);
        let twice = inject(&once, &items, DISCLOSURE);
        assert_eq!(once, twice);
        assert_eq!(twice.matches(DISCLOSURE).count(), 1);
        assert_eq!(twice.matches("](https://shop.example/p1)").count(), 1);
        assert_eq!(twice.matches("](https://shop.example/p2)").count(), 1);
    }

    #[test]
    fn disclosure_naming_an_item_stays_single() {
        let partner = item("cp", "Coupang", &["shopping"]);
        let disclosure = "This post is part of the Coupang Partners program.";

        let once = inject("Shopping tips for the week.", &[&partner], disclosure);
        let twice = inject(&once, &[&partner], disclosure);
        assert_eq!(once, twice);
        assert_eq!(twice.matches(disclosure).count(), 1);
        assert!(!twice.contains("[Coupang]"));
    }

    #[test]
    fn existing_links_and_urls_are_not_rewritten() {
        let laptop = item("p1", "laptop", &["laptop"]);
        let content = "See [my review](https://blog.example/laptop) of this laptop.";
        let out = inject(content, &[&laptop], DISCLOSURE);
        assert!(out.starts_with(
            "See [my review](https://blog.example/laptop) of this [laptop](https://shop.example/p1)."
        ));

        let label = "Read [the laptop guide](https://blog.example/guide) first.";
        let out = inject(label, &[&laptop], DISCLOSURE);
        assert!(out.starts_with(label));
        assert!(!out.contains("shop.example"));

        let bare = "Specs at https://blog.example/laptop-specs only.";
        let out = inject(bare, &[&laptop], DISCLOSURE);
        assert!(out.starts_with(bare));
    }

    #[test]
    fn no_items_leaves_content_untouched() {
        assert_eq!(inject("plain", &[], DISCLOSURE), "plain");
    }

    #[test]
    fn matched_items_follow_score_order() {
        let catalog = vec![item("a", "A", &[]), item("b", "B", &[])];
        let scores = vec![
            MatchScore { item_id: "b".into(), score: 90 },
            MatchScore { item_id: "a".into(), score: 40 },
        ];
        let items = matched_items(&catalog, &scores);
        assert_eq!(items[0].id, "b");
        assert_eq!(items[1].id, "a");
    }
}
