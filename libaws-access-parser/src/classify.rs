use regex::Regex;

/// A tag and the pattern that selects it.
#[derive(Clone, Debug)]
pub struct Rule {
    pub tag: String,
    pub pattern: Regex,
}

impl Rule {
    pub fn new(tag: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            tag: tag.into(),
            pattern: Regex::new(pattern)?,
        })
    }
}

/// Maps request paths to metric tags. Rules are tried in order and the first
/// match wins.
#[derive(Clone, Debug)]
pub struct Classifier {
    rules: Vec<Rule>,
    default_tag: String,
}

impl Classifier {
    pub fn new(rules: Vec<Rule>, default_tag: impl Into<String>) -> Self {
        Self {
            rules,
            default_tag: default_tag.into(),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn default_tag(&self) -> &str {
        &self.default_tag
    }

    pub fn classify(&self, path: Option<&str>) -> &str {
        classify(path.unwrap_or_default(), &self.rules, &self.default_tag)
    }
}

/// Returns the tag of the first rule whose pattern matches anywhere in
/// `path`, or `default_tag` when nothing matches or `path` is empty.
pub fn classify<'r>(path: &str, rules: &'r [Rule], default_tag: &'r str) -> &'r str {
    if path.is_empty() {
        return default_tag;
    }
    rules
        .iter()
        .find(|rule| rule.pattern.is_match(path))
        .map_or(default_tag, |rule| rule.tag.as_str())
}

#[test]
fn test_classify() {
    let rules = vec![
        Rule::new("auth", r"^/auth").unwrap(),
        Rule::new("settings", r"^/settings").unwrap(),
    ];

    assert_eq!(classify("/settings/profile", &rules, "other"), "settings");
    assert_eq!(classify("/auth/v1/session", &rules, "other"), "auth");
    assert_eq!(classify("/unmapped", &rules, "other"), "other");
    assert_eq!(classify("", &rules, "other"), "other");
    assert_eq!(classify("/settings", &[], "other"), "other");
}

#[test]
fn test_classify_first_match_wins() {
    let classifier = Classifier::new(
        vec![
            Rule::new("avatar", "avatar").unwrap(),
            Rule::new("settings", "^/settings").unwrap(),
            Rule::new("catchall", ".*").unwrap(),
        ],
        "other",
    );

    assert_eq!(classifier.classify(Some("/settings/avatar/change")), "avatar");
    assert_eq!(classifier.classify(Some("/settings/emails")), "settings");
    assert_eq!(classifier.classify(Some("/signin")), "catchall");
    assert_eq!(classifier.classify(None), "other");
    assert_eq!(classifier.default_tag(), "other");
}
