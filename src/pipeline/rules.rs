//! Keyword rules for classifying tenant messages.
//!
//! Every table here is an ordered list and the first match wins:
//! - category rules are tried in priority order (maintenance first)
//! - subcategory rules are tried in the order they are declared for a category
//! - the emergency keyword set is checked before the standard set
//!
//! No LLM involved. `classify` always returns a result.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::pipeline::location::extract_unit;
use crate::pipeline::types::ClassificationResult;
use crate::tickets::model::{RequestType, TicketCategory, Urgency};

/// Build a case-insensitive regex matching any keyword at a word start.
///
/// Only the leading edge is anchored so `leak` also matches `leaking`.
fn keyword_regex(keywords: &[&str]) -> Regex {
    keyword_regex_with_words(keywords, &[])
}

/// Like [`keyword_regex`], plus `words` that must match as whole words
/// (`help` but not `helpful`).
fn keyword_regex_with_words(keywords: &[&str], words: &[&str]) -> Regex {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .chain(words.iter().map(|w| format!(r"{}\b", regex::escape(w))))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})", alternation)).expect("keyword regex is valid")
}

/// A category rule: keywords → (category, request type).
#[derive(Debug, Clone)]
pub struct CategoryRule {
    /// Rule name for logging (e.g. "lockout").
    pub name: String,
    pub regex: Regex,
    pub category: TicketCategory,
    pub request_type: RequestType,
}

/// A subcategory rule within one category.
#[derive(Debug, Clone)]
pub struct SubcategoryRule {
    pub subcategory: String,
    pub regex: Regex,
}

fn rule(
    name: &str,
    keywords: &[&str],
    category: TicketCategory,
    request_type: RequestType,
) -> CategoryRule {
    CategoryRule {
        name: name.to_string(),
        regex: keyword_regex(keywords),
        category,
        request_type,
    }
}

fn sub(subcategory: &str, keywords: &[&str]) -> SubcategoryRule {
    SubcategoryRule {
        subcategory: subcategory.to_string(),
        regex: keyword_regex(keywords),
    }
}

/// Ordered subcategory rules for one category plus the fallback name.
#[derive(Debug, Clone)]
pub struct SubcategoryTable {
    pub category: TicketCategory,
    pub rules: Vec<SubcategoryRule>,
    pub fallback: String,
}

impl SubcategoryTable {
    fn new(category: TicketCategory, rules: Vec<SubcategoryRule>, fallback: &str) -> Self {
        Self {
            category,
            rules,
            fallback: fallback.to_string(),
        }
    }

    fn resolve(&self, text: &str) -> &str {
        self.rules
            .iter()
            .find(|r| r.regex.is_match(text))
            .map(|r| r.subcategory.as_str())
            .unwrap_or(&self.fallback)
    }
}

/// Keyword-driven pattern matcher.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    category_rules: Vec<CategoryRule>,
    subcategories: Vec<SubcategoryTable>,
    emergency: Regex,
    standard: Regex,
    contractor: Regex,
    fallback_category: TicketCategory,
    fallback_request_type: RequestType,
}

impl PatternMatcher {
    /// Create a matcher with the default property-management rule tables.
    pub fn default_rules() -> Self {
        use TicketCategory::*;

        let category_rules = vec![
            rule(
                "maintenance",
                &[
                    "broken", "fix", "repair", "maintenance", "not working", "leak", "toilet",
                    "faucet", "heater", "air conditioning", "plumbing", "electrical", "hvac",
                    "appliance", "damage",
                ],
                Maintenance,
                RequestType::Repair,
            ),
            CategoryRule {
                name: "lockout".to_string(),
                regex: keyword_regex_with_words(
                    &[
                        "locked out", "lockout", "lost key", "lost my key", "can't get in",
                        "cannot get in", "keys", "door", "entrance", "keycard", "entry",
                    ],
                    &["lock", "access"],
                ),
                category: Maintenance,
                request_type: RequestType::Emergency,
            },
            rule(
                "utilities",
                &[
                    "utility", "utilities", "power outage", "no power", "electricity",
                    "internet", "wifi", "wi-fi", "water bill", "gas bill", "water shut",
                    "gas service",
                ],
                Utilities,
                RequestType::General,
            ),
            rule(
                "complaint",
                &[
                    "noise", "complain", "neighbor", "disturbance", "problem", "loud", "party",
                    "music", "shouting", "annoying",
                ],
                Complaint,
                RequestType::General,
            ),
            rule(
                "payment",
                &[
                    "rent", "payment", "late fee", "balance", "deposit", "charge", "invoice",
                    "bill", "overdue", "money",
                ],
                Payment,
                RequestType::General,
            ),
            rule(
                "move_in_out",
                &[
                    "move in", "move-in", "moving in", "move out", "move-out", "moving out",
                    "moving", "vacate", "walkthrough", "walk-through",
                ],
                MoveInOut,
                RequestType::Inspection,
            ),
            rule(
                "lease",
                &[
                    "lease", "contract", "renewal", "renew", "termination", "end of lease",
                    "extend", "sublet",
                ],
                Lease,
                RequestType::General,
            ),
            rule(
                "amenity",
                &[
                    "pool", "gym", "laundry", "parking", "amenity", "facility", "clubhouse",
                    "mailroom", "elevator",
                ],
                Amenity,
                RequestType::Repair,
            ),
        ];

        let subcategories = vec![
            SubcategoryTable::new(
                Maintenance,
                vec![
                    sub("Plumbing", &["toilet", "sink", "faucet", "pipe", "leak", "water", "drain", "clog"]),
                    sub("Electrical", &["electrical", "outlet", "switch", "power", "light", "breaker"]),
                    sub("HVAC", &["hvac", "heating", "heater", "cooling", "air conditioning", "furnace", "thermostat", "no heat"]),
                    sub("Appliance", &["refrigerator", "fridge", "stove", "oven", "dishwasher", "washer", "dryer", "microwave", "appliance"]),
                    sub("Cleaning", &["clean", "dirty", "trash", "pest", "mold", "cockroach", "mice"]),
                ],
                "General Repair",
            ),
            SubcategoryTable::new(
                Utilities,
                vec![
                    sub("Water", &["water"]),
                    sub("Electricity", &["electricity", "power"]),
                    sub("Gas", &["gas"]),
                    sub("Internet", &["internet", "wifi", "wi-fi", "cable"]),
                ],
                "Other",
            ),
            SubcategoryTable::new(
                Lease,
                vec![
                    sub("Renewal", &["renew", "renewal", "extend"]),
                    sub("Termination", &["terminate", "termination", "break my lease", "break the lease", "end of lease"]),
                    sub("Violation", &["violation", "breach"]),
                ],
                "Other",
            ),
            SubcategoryTable::new(
                MoveInOut,
                vec![
                    sub("Move-in", &["move in", "move-in", "moving in"]),
                    sub("Move-out", &["move out", "move-out", "moving out", "vacate"]),
                ],
                "Other",
            ),
            SubcategoryTable::new(
                Complaint,
                vec![
                    sub("Noise Complaint", &["noise", "loud", "music", "party"]),
                    sub("Neighbor Dispute", &["neighbor", "dispute", "conflict"]),
                ],
                "Other",
            ),
            SubcategoryTable::new(
                Payment,
                vec![sub("Late Fees", &["late fee", "penalty"])],
                "Rent Payment",
            ),
            SubcategoryTable::new(
                Amenity,
                vec![
                    sub("Pool", &["pool"]),
                    sub("Gym", &["gym"]),
                    sub("Parking", &["parking"]),
                    sub("Laundry", &["laundry"]),
                ],
                "Other",
            ),
        ];

        Self {
            category_rules,
            subcategories,
            emergency: keyword_regex_with_words(
                &[
                    "emergency", "urgent", "immediate", "flooding", "flooded", "gas leak",
                    "fire", "smoke", "water damage", "electrical hazard", "sparks", "no heat",
                    "no hot water", "toilet overflow", "ceiling leak",
                ],
                &["help"],
            ),
            standard: keyword_regex(&[
                "broken", "not working", "repair", "fix", "issue", "problem", "leak",
            ]),
            contractor: keyword_regex(&["electrical", "plumbing", "hvac", "appliance", "major"]),
            fallback_category: Maintenance,
            fallback_request_type: RequestType::General,
        }
    }

    /// Classify message text. Pure and total.
    pub fn classify(&self, text: &str) -> ClassificationResult {
        let (category, request_type) = self.category(text);
        let subcategory = self.subcategory(text, category).to_string();
        let urgency = self.urgency(text);
        let location = extract_unit(text);

        debug!(
            category = %category,
            subcategory = %subcategory,
            urgency = %urgency,
            unit = %location,
            "Classified message"
        );

        ClassificationResult {
            category,
            subcategory,
            request_type,
            urgency,
            location,
            requires_contractor: self.contractor.is_match(text),
        }
    }

    /// First category rule that matches, else the fallback.
    pub fn category(&self, text: &str) -> (TicketCategory, RequestType) {
        self.category_rules
            .iter()
            .find(|rule| rule.regex.is_match(text))
            .map(|rule| {
                debug!(rule = %rule.name, "Category rule matched");
                (rule.category, rule.request_type)
            })
            .unwrap_or((self.fallback_category, self.fallback_request_type))
    }

    /// First declared subcategory of `category` that matches, else its fallback.
    pub fn subcategory(&self, text: &str, category: TicketCategory) -> &str {
        self.subcategories
            .iter()
            .find(|t| t.category == category)
            .map(|t| t.resolve(text))
            .unwrap_or("Other")
    }

    /// Emergency keywords short-circuit to High; standard keywords give Medium.
    pub fn urgency(&self, text: &str) -> Urgency {
        if self.emergency.is_match(text) {
            Urgency::High
        } else if self.standard.is_match(text) {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::default_rules()
    }
}

static DEFAULT_MATCHER: LazyLock<PatternMatcher> = LazyLock::new(PatternMatcher::default_rules);

/// Classify text with the default rule tables.
pub fn classify(text: &str) -> ClassificationResult {
    DEFAULT_MATCHER.classify(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::location::UnitLocation;

    #[test]
    fn gas_leak_example() {
        let result = classify("EMERGENCY gas leak in apt 4C");
        assert_eq!(result.category, TicketCategory::Maintenance);
        assert_eq!(result.subcategory, "Plumbing");
        assert_eq!(result.urgency, Urgency::High);
        assert_eq!(result.urgency.code(), "1");
        assert_eq!(result.location.to_string(), "Unit 4C");
        assert_eq!(result.property_id(), "P4C0");
    }

    #[test]
    fn emergency_wins_over_standard_keywords() {
        for text in [
            "urgent: the sink is broken and not working",
            "There is a problem, smoke coming from the outlet, please fix",
            "Flooding in the basement, repair issue",
            "no hot water - the heater is broken",
        ] {
            assert_eq!(classify(text).urgency, Urgency::High, "{text}");
        }
    }

    #[test]
    fn help_is_an_emergency_word() {
        let r = classify("Please help, water is pouring through my ceiling in apt 3A");
        assert_eq!(r.urgency, Urgency::High);
        assert_eq!(r.urgency.code(), "1");

        // Whole word only.
        assert_eq!(classify("Thanks, the pool staff were helpful").urgency, Urgency::Low);
    }

    #[test]
    fn lockout_keywords_route_to_emergency() {
        let r = classify("Help! I can't access my apartment 5B");
        assert_eq!(r.category, TicketCategory::Maintenance);
        assert_eq!(r.request_type, RequestType::Emergency);
        assert_eq!(r.urgency, Urgency::High);

        for text in [
            "Left my keys inside",
            "The front door code changed",
            "Entrance gate will not open for me",
            "My lock is jammed",
            "Entry fob stopped working",
            "No access to the building",
        ] {
            let r = classify(text);
            assert_eq!(
                (r.category, r.request_type),
                (TicketCategory::Maintenance, RequestType::Emergency),
                "{text}"
            );
        }
    }

    #[test]
    fn standard_and_low_urgency() {
        assert_eq!(classify("My dishwasher is broken").urgency, Urgency::Medium);
        assert_eq!(classify("Question about the pool schedule").urgency, Urgency::Low);
    }

    #[test]
    fn category_priority_order() {
        // "leak" (maintenance) beats "rent" (payment) because maintenance is first.
        let result = classify("Paid my rent but the faucet has a leak");
        assert_eq!(result.category, TicketCategory::Maintenance);

        let result = classify("I got locked out of my place");
        assert_eq!(result.category, TicketCategory::Maintenance);
        assert_eq!(result.request_type, RequestType::Emergency);
    }

    #[test]
    fn subcategory_declared_order() {
        // Mentions both a toilet (Plumbing) and a light (Electrical); Plumbing is declared first.
        let result = classify("The toilet light is broken");
        assert_eq!(result.subcategory, "Plumbing");

        let result = classify("The oven is not working");
        assert_eq!(result.subcategory, "Appliance");

        let result = classify("The cabinet door needs repair");
        assert_eq!(result.subcategory, "General Repair");
    }

    #[test]
    fn other_categories() {
        let r = classify("Loud music from upstairs every night");
        assert_eq!((r.category, r.subcategory.as_str()), (TicketCategory::Complaint, "Noise Complaint"));

        let r = classify("Why was I charged a late fee?");
        assert_eq!((r.category, r.subcategory.as_str()), (TicketCategory::Payment, "Late Fees"));

        let r = classify("When is rent due?");
        assert_eq!((r.category, r.subcategory.as_str()), (TicketCategory::Payment, "Rent Payment"));

        let r = classify("I want to renew my lease");
        assert_eq!((r.category, r.subcategory.as_str()), (TicketCategory::Lease, "Renewal"));

        let r = classify("Scheduling my move-out walkthrough");
        assert_eq!((r.category, r.subcategory.as_str()), (TicketCategory::MoveInOut, "Move-out"));

        let r = classify("The internet has been down since Monday");
        assert_eq!((r.category, r.subcategory.as_str()), (TicketCategory::Utilities, "Internet"));

        let r = classify("Is the gym open on Sundays?");
        assert_eq!((r.category, r.subcategory.as_str()), (TicketCategory::Amenity, "Gym"));
    }

    #[test]
    fn unmatched_text_falls_back() {
        let r = classify("Hello there");
        assert_eq!(r.category, TicketCategory::Maintenance);
        assert_eq!(r.request_type, RequestType::General);
        assert_eq!(r.subcategory, "General Repair");
        assert_eq!(r.urgency, Urgency::Low);
        assert_eq!(r.location, UnitLocation::Unspecified);
        assert!(!r.requires_contractor);
    }

    #[test]
    fn contractor_flag() {
        assert!(classify("Electrical panel is buzzing").requires_contractor);
        assert!(!classify("Noise from the hallway").requires_contractor);
    }

    #[test]
    fn classify_is_deterministic() {
        let text = "Heater broken in unit 12, no heat since yesterday";
        assert_eq!(classify(text), classify(text));
    }
}
