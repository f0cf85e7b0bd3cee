//! Tool Router: keyword and pattern scoring over the fixed capability set.
//!
//! Every capability is scored independently (not a competitive softmax): each
//! matched keyword or pattern adds its weight, and the sum is clamped to 0.0-1.0.
//! The highest-scoring capability wins; exact ties go to the more specific
//! capability (see [`Capability::specificity_rank`]). When nothing reaches
//! `min_confidence`, the configured fallback capability is used.
//!
//! Scores are cached in an LRU keyed by the normalized query prefix, so
//! repeated questions in a chat session skip the regex pass. An entry only
//! counts as a hit when its full normalized query matches.

use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::types::{Capability, truncate_chars};
use lru::LruCache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use tracing::{debug, info, warn};

/// Characters of the normalized query used as the cache key.
const CACHE_KEY_CHARS: usize = 200;

/// Weight given to keywords added through `router.extra_keywords`.
const EXTRA_KEYWORD_WEIGHT: f64 = 0.4;

/// Built-in keywords per capability. A trailing `*` matches any word suffix.
fn builtin_keywords(capability: Capability) -> &'static [(&'static str, f64)] {
    match capability {
        Capability::Retrieval => &[
            ("what is", 0.2),
            ("what are", 0.2),
            ("how to", 0.25),
            ("how do", 0.2),
            ("how can", 0.2),
            ("which", 0.15),
            ("when", 0.15),
            ("why", 0.15),
            ("symptom*", 0.3),
            ("treat*", 0.2),
            ("control", 0.2),
            ("fertili*", 0.2),
            ("manure", 0.2),
            ("crop*", 0.15),
            ("soil", 0.15),
            ("seed*", 0.2),
            ("sow*", 0.2),
            ("harvest*", 0.2),
            ("variet*", 0.2),
            ("recommend*", 0.2),
            ("guide*", 0.3),
            ("manual", 0.3),
            ("according to", 0.3),
            ("scheme*", 0.3),
        ],
        Capability::Generation => &[
            ("write", 0.4),
            ("draft", 0.4),
            ("compose", 0.4),
            ("generat*", 0.4),
            ("summar*", 0.4),
            ("rewrite", 0.4),
            ("explain", 0.3),
            ("create", 0.3),
            ("poem", 0.3),
            ("story", 0.3),
            ("letter", 0.2),
            ("describe", 0.2),
            ("outline", 0.2),
            ("plan", 0.2),
            ("tips", 0.2),
        ],
        Capability::Translation => &[
            ("translat*", 0.6),
            ("meaning of", 0.2),
            ("in english", 0.3),
        ],
        Capability::Prediction => &[
            ("predict*", 0.5),
            ("forecast*", 0.4),
            ("estimat*", 0.3),
            ("yield", 0.4),
            ("irrigat*", 0.4),
            ("how much", 0.15),
            ("expected", 0.15),
            ("rainfall", 0.15),
            ("humidity", 0.15),
            ("soil moisture", 0.2),
            ("temperature", 0.1),
        ],
        Capability::WebSearch => &[
            ("latest", 0.4),
            ("news", 0.4),
            ("today", 0.3),
            ("current*", 0.3),
            ("price*", 0.3),
            ("market rate*", 0.3),
            ("mandi", 0.3),
            ("search the web", 0.6),
            ("search online", 0.6),
            ("online", 0.3),
            ("google", 0.4),
            ("weather", 0.3),
            ("this week", 0.2),
        ],
    }
}

/// Built-in regex patterns per capability, as `(label, pattern, weight)`.
fn builtin_patterns(capability: Capability) -> &'static [(&'static str, &'static str, f64)] {
    match capability {
        Capability::Retrieval => &[(
            "crop disease or pest",
            r"\b(?:blight|rust|wilt|rot|mildew|aphids?|borers?|weevils?|locusts?|pests?|diseases?)\b",
            0.3,
        )],
        Capability::Generation => &[],
        Capability::Translation => &[
            (
                "target language",
                r"\b(?:to|into|in)\s+(?:hindi|marathi|tamil|telugu|bengali|kannada|gujarati|punjabi|malayalam|odia|urdu|english|french|spanish|swahili|german|portuguese)\b",
                0.5,
            ),
            (
                "language name",
                r"\b(?:hindi|marathi|tamil|telugu|bengali|kannada|gujarati|punjabi|malayalam|odia|urdu|french|spanish|swahili|german|portuguese)\b",
                0.2,
            ),
        ],
        Capability::Prediction => &[(
            "numeric measurement",
            r"\b\d+(?:\.\d+)?\s*(?:mm|°c|%|kg/ha|kg|t/ha|tonnes?)(?:\s|$|[,.;)])",
            0.3,
        )],
        Capability::WebSearch => &[("recent year", r"\b20[2-9]\d\b", 0.2)],
    }
}

/// Phrases signalling that a query chains several steps.
const CHAIN_CUE_PATTERN: &str = r"\b(?:then|after that|also|compare|step by step)\b";

/// A compiled keyword or pattern with its weight.
#[derive(Debug, Clone)]
struct Matcher {
    label: String,
    regex: Regex,
    weight: f64,
}

impl Matcher {
    /// Compile a keyword; `*` suffix means prefix match.
    fn keyword(keyword: &str, weight: f64) -> Option<Self> {
        let (stem, prefix) = match keyword.strip_suffix('*') {
            Some(stem) => (stem, true),
            None => (keyword, false),
        };
        let pattern = if prefix {
            format!(r"\b{}", regex::escape(stem))
        } else {
            format!(r"\b{}\b", regex::escape(stem))
        };
        Self::pattern(keyword, &pattern, weight)
    }

    fn pattern(label: &str, pattern: &str, weight: f64) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(regex) => Some(Self {
                label: label.to_string(),
                regex,
                weight,
            }),
            Err(e) => {
                warn!(label, error = %e, "Skipping invalid routing pattern");
                None
            }
        }
    }
}

/// Score of one capability for a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapabilityScore {
    pub capability: Capability,
    pub score: f64,
}

/// The router's decision for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    /// The selected capability.
    pub capability: Capability,
    /// Score of the selected capability (0.0-1.0).
    pub confidence: f64,
    /// All capabilities, best first.
    pub scores: Vec<CapabilityScore>,
    /// Keywords/patterns that matched for the selected capability.
    pub matched: Vec<String>,
    /// Whether the fallback capability was used.
    pub fallback: bool,
    /// Whether the scores came from the cache.
    pub cache_hit: bool,
    /// Human-readable routing reasoning.
    pub reasoning: String,
}

impl RouteDecision {
    /// Name of the tool backing the selected capability.
    pub fn tool_name(&self) -> &'static str {
        self.capability.tool_name()
    }

    /// Score of a specific capability.
    pub fn score_of(&self, capability: Capability) -> f64 {
        self.scores
            .iter()
            .find(|s| s.capability == capability)
            .map(|s| s.score)
            .unwrap_or(0.0)
    }
}

/// Routing statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterStats {
    pub total_routed: u64,
    pub cache_hits: u64,
    pub fallbacks: u64,
    pub capability_hits: BTreeMap<Capability, u64>,
}

/// Cached scoring result for a normalized query.
#[derive(Debug, Clone)]
struct CachedScores {
    query: String,
    scores: Vec<CapabilityScore>,
    matched: HashMap<Capability, Vec<String>>,
}

/// Keyword/pattern router over the capability set.
pub struct ToolRouter {
    config: RouterConfig,
    matchers: HashMap<Capability, Vec<Matcher>>,
    chain_cue: Option<Regex>,
    cache: LruCache<String, CachedScores>,
    stats: RouterStats,
}

impl ToolRouter {
    pub fn new(config: RouterConfig) -> Self {
        let cache_size = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);

        let mut matchers: HashMap<Capability, Vec<Matcher>> = HashMap::new();
        for &capability in Capability::all() {
            let entry = matchers.entry(capability).or_default();
            entry.extend(
                builtin_keywords(capability)
                    .iter()
                    .filter_map(|(kw, w)| Matcher::keyword(kw, *w)),
            );
            entry.extend(
                builtin_patterns(capability)
                    .iter()
                    .filter_map(|(label, p, w)| Matcher::pattern(label, p, *w)),
            );
        }

        for (name, keywords) in &config.extra_keywords {
            match name.parse::<Capability>() {
                Ok(capability) => {
                    let entry = matchers.entry(capability).or_default();
                    entry.extend(keywords.iter().filter_map(|kw| {
                        Matcher::keyword(&kw.trim().to_lowercase(), EXTRA_KEYWORD_WEIGHT)
                    }));
                }
                Err(e) => warn!(capability = %name, error = %e, "Ignoring extra keywords"),
            }
        }

        let chain_cue = Regex::new(CHAIN_CUE_PATTERN).ok();

        Self {
            config,
            matchers,
            chain_cue,
            cache: LruCache::new(cache_size),
            stats: RouterStats::default(),
        }
    }

    /// Lowercase and collapse whitespace.
    pub fn normalize(query: &str) -> String {
        query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Route a query to one capability.
    ///
    /// 1. Normalize and check the LRU cache
    /// 2. Score every capability independently
    /// 3. Sort by score, breaking ties by specificity
    /// 4. Fall back when the best score is below `min_confidence`
    pub fn route(&mut self, query: &str) -> Result<RouteDecision, RouterError> {
        let normalized = Self::normalize(query);
        if normalized.is_empty() {
            return Err(RouterError::EmptyQuery);
        }
        let cache_key = truncate_chars(&normalized, CACHE_KEY_CHARS).to_string();

        let (cached, cache_hit) = match self.cache.get(&cache_key) {
            Some(cached) if cached.query == normalized => (cached.clone(), true),
            _ => {
                let scored = self.score_normalized(&normalized);
                self.cache.put(cache_key, scored.clone());
                (scored, false)
            }
        };

        let best = cached.scores[0];
        let (capability, fallback) = if best.score < self.config.min_confidence {
            (self.config.fallback, true)
        } else {
            (best.capability, false)
        };
        let confidence = cached
            .scores
            .iter()
            .find(|s| s.capability == capability)
            .map(|s| s.score)
            .unwrap_or(0.0);
        let matched = cached.matched.get(&capability).cloned().unwrap_or_default();

        let reasoning = self.build_reasoning(&cached.scores, capability, fallback, &matched, cache_hit);

        self.stats.total_routed += 1;
        if cache_hit {
            self.stats.cache_hits += 1;
        }
        if fallback {
            self.stats.fallbacks += 1;
        }
        *self.stats.capability_hits.entry(capability).or_insert(0) += 1;

        info!(
            capability = %capability,
            confidence = format!("{confidence:.2}"),
            fallback,
            cache_hit,
            "Routed query"
        );

        Ok(RouteDecision {
            capability,
            confidence,
            scores: cached.scores,
            matched,
            fallback,
            cache_hit,
            reasoning,
        })
    }

    /// Score all capabilities for a query without touching the cache or stats.
    pub fn score(&self, query: &str) -> Vec<CapabilityScore> {
        self.score_normalized(&Self::normalize(query)).scores
    }

    fn score_normalized(&self, normalized: &str) -> CachedScores {
        let mut scores = Vec::with_capacity(Capability::all().len());
        let mut matched = HashMap::new();

        for &capability in Capability::all() {
            let mut total = 0.0;
            let mut hits = Vec::new();
            if let Some(matchers) = self.matchers.get(&capability) {
                for m in matchers {
                    if m.regex.is_match(normalized) {
                        total += m.weight;
                        hits.push(m.label.clone());
                    }
                }
            }
            scores.push(CapabilityScore {
                capability,
                score: f64::clamp(total, 0.0, 1.0),
            });
            matched.insert(capability, hits);
        }

        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.capability
                        .specificity_rank()
                        .cmp(&b.capability.specificity_rank())
                })
        });

        debug!(query = normalized, ?scores, "Scored capabilities");
        CachedScores {
            query: normalized.to_string(),
            scores,
            matched,
        }
    }

    fn build_reasoning(
        &self,
        scores: &[CapabilityScore],
        selected: Capability,
        fallback: bool,
        matched: &[String],
        cache_hit: bool,
    ) -> String {
        let scored = scores
            .iter()
            .map(|s| format!("{}({:.2})", s.capability, s.score))
            .collect::<Vec<_>>()
            .join(", ");
        let choice = if fallback {
            format!(
                "No capability reached {:.2}; falling back to {}.",
                self.config.min_confidence, selected
            )
        } else if matched.is_empty() {
            format!("Selected {selected}.")
        } else {
            format!("Selected {selected} (matched: {}).", matched.join(", "))
        };
        format!(
            "Scored {} capabilities: {scored}. {choice} Cache {}.",
            scores.len(),
            if cache_hit { "hit" } else { "miss" }
        )
    }

    /// Whether a query should go through the multi-step agent loop.
    ///
    /// True when two or more capabilities score at least `agent_threshold`,
    /// or the query contains a chaining cue ("and then", "compare", ...).
    pub fn needs_agent(&self, query: &str, decision: &RouteDecision) -> bool {
        let strong = decision
            .scores
            .iter()
            .filter(|s| s.score >= self.config.agent_threshold && s.score > 0.0)
            .count();
        if strong >= 2 {
            return true;
        }
        let normalized = Self::normalize(query);
        self.chain_cue
            .as_ref()
            .map(|re| re.is_match(&normalized))
            .unwrap_or(false)
    }

    /// Drop all cached scores.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(query: &str) -> RouteDecision {
        ToolRouter::default().route(query).unwrap()
    }

    #[test]
    fn test_route_translation() {
        let decision = route("Translate 'wheat rust' into Hindi");
        assert_eq!(decision.capability, Capability::Translation);
        assert_eq!(decision.tool_name(), "translate");
        assert!((decision.confidence - 1.0).abs() < f64::EPSILON);
        assert!(decision.matched.contains(&"translat*".to_string()));
        assert!(!decision.fallback);
    }

    #[test]
    fn test_route_prediction() {
        let decision = route("Predict the maize yield with rainfall 650 mm and temperature 28 C");
        assert_eq!(decision.capability, Capability::Prediction);
        assert!(decision.matched.contains(&"numeric measurement".to_string()));
    }

    #[test]
    fn test_route_web_search() {
        let decision = route("latest news on onion prices");
        assert_eq!(decision.capability, Capability::WebSearch);
    }

    #[test]
    fn test_route_generation() {
        let decision = route("Write a short poem about the monsoon");
        assert_eq!(decision.capability, Capability::Generation);
        assert!((decision.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_route_retrieval() {
        let decision = route("How do I treat leaf blight in rice?");
        assert_eq!(decision.capability, Capability::Retrieval);
        assert_eq!(decision.tool_name(), "knowledge_search");
    }

    #[test]
    fn test_route_fallback_when_nothing_matches() {
        let decision = route("hello there");
        assert!(decision.fallback);
        assert_eq!(decision.capability, Capability::Retrieval);
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.reasoning.contains("falling back"));
    }

    #[test]
    fn test_route_custom_fallback() {
        let config = RouterConfig {
            fallback: Capability::Generation,
            ..Default::default()
        };
        let decision = ToolRouter::new(config).route("hello there").unwrap();
        assert_eq!(decision.capability, Capability::Generation);
        assert!(decision.fallback);
    }

    #[test]
    fn test_route_empty_query() {
        let mut router = ToolRouter::default();
        assert!(matches!(router.route("   \n\t"), Err(RouterError::EmptyQuery)));
        assert_eq!(router.stats().total_routed, 0);
    }

    #[test]
    fn test_tie_break_prefers_specific_capability() {
        // "create" (generation, 0.3) vs "today" (web search, 0.3).
        let decision = route("create something today");
        assert_eq!(decision.score_of(Capability::Generation), 0.3);
        assert_eq!(decision.score_of(Capability::WebSearch), 0.3);
        assert_eq!(decision.capability, Capability::WebSearch);
    }

    #[test]
    fn test_scores_sorted_and_complete() {
        let decision = route("Translate the irrigation guide into Tamil");
        assert_eq!(decision.scores.len(), 5);
        for pair in decision.scores.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(decision.scores[0].capability, decision.capability);
    }

    #[test]
    fn test_route_caching_normalizes_whitespace_and_case() {
        let mut router = ToolRouter::default();
        let first = router.route("Latest NEWS  on cotton").unwrap();
        assert!(!first.cache_hit);
        let second = router.route("  latest news on   cotton ").unwrap();
        assert!(second.cache_hit);
        assert_eq!(first.capability, second.capability);
        assert!(second.reasoning.contains("Cache hit"));
    }

    #[test]
    fn test_route_cache_ignores_shared_long_prefix() {
        let prefix = "a".repeat(CACHE_KEY_CHARS);
        let translate = format!("{prefix} translate into hindi");
        let news = format!("{prefix} latest onion price news");

        let fresh = route(&news);
        assert_eq!(fresh.capability, Capability::WebSearch);

        let mut router = ToolRouter::default();
        assert_eq!(
            router.route(&translate).unwrap().capability,
            Capability::Translation
        );
        let after = router.route(&news).unwrap();
        assert!(!after.cache_hit);
        assert_eq!(after.capability, fresh.capability);
        assert_eq!(after.scores, fresh.scores);

        let again = router.route(&news).unwrap();
        assert!(again.cache_hit);
        assert_eq!(again.capability, Capability::WebSearch);
    }

    #[test]
    fn test_route_stats() {
        let mut router = ToolRouter::default();
        router.route("translate this into hindi").unwrap();
        router.route("translate this into hindi").unwrap();
        router.route("hello").unwrap();
        let stats = router.stats();
        assert_eq!(stats.total_routed, 3);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.fallbacks, 1);
        assert_eq!(stats.capability_hits[&Capability::Translation], 2);
        assert_eq!(stats.capability_hits[&Capability::Retrieval], 1);
    }

    #[test]
    fn test_extra_keywords() {
        let mut config = RouterConfig::default();
        config
            .extra_keywords
            .insert("prediction".to_string(), vec!["Tonnage".to_string()]);
        let mut router = ToolRouter::new(config);
        let decision = router.route("tonnage for my farm").unwrap();
        assert_eq!(decision.capability, Capability::Prediction);
        assert!((decision.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_keywords_respect_word_boundaries() {
        let router = ToolRouter::default();
        // "newsletter" must not count as "news"; "snowstorm" must not match "sow*".
        let scores = router.score("newsletter about a snowstorm");
        assert!(scores.iter().all(|s| s.score == 0.0));
    }

    #[test]
    fn test_needs_agent_multi_intent() {
        let mut router = ToolRouter::default();
        let query = "Find the recommended fertilizer dose for wheat and translate it into Marathi";
        let decision = router.route(query).unwrap();
        assert!(router.needs_agent(query, &decision));
    }

    #[test]
    fn test_needs_agent_chain_cue() {
        let mut router = ToolRouter::default();
        let query = "Summarize the report, then email it";
        let decision = router.route(query).unwrap();
        assert!(router.needs_agent(query, &decision));
    }

    #[test]
    fn test_needs_agent_single_intent() {
        let mut router = ToolRouter::default();
        let query = "Write a short poem about the monsoon";
        let decision = router.route(query).unwrap();
        assert!(!router.needs_agent(query, &decision));
    }
}
