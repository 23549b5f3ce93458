use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    len: usize,
    pattern: Regex,
}

impl Rule {
    fn parse(allow: bool, path: &str) -> Option<Self> {
        // `*` matches any run of characters, a trailing `$` anchors the end
        let (body, anchored) = match path.strip_suffix('$') {
            Some(body) => (body, true),
            None => (path, false),
        };
        let mut source = String::from("^");
        for (i, part) in body.split('*').enumerate() {
            if i > 0 {
                source.push_str(".*");
            }
            source.push_str(&regex::escape(part));
        }
        if anchored {
            source.push('$');
        }
        Some(Self {
            allow,
            len: path.len(),
            pattern: Regex::new(&source).ok()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// Parsed `robots.txt`.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<Group>,
}

impl RobotsRules {
    /// Rules that allow everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Rules that forbid everything.
    pub fn disallow_all() -> Self {
        Self::parse("User-agent: *\nDisallow: /\n")
    }

    pub fn parse(source: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut in_rules = false;
        for line in source.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    if in_rules {
                        groups.push(std::mem::take(&mut current));
                        in_rules = false;
                    }
                    current.agents.push(value.to_ascii_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    let allow = key.trim().eq_ignore_ascii_case("allow");
                    // an empty Disallow allows everything
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(rule) = Rule::parse(allow, value) {
                        current.rules.push(rule);
                    }
                }
                _ => {}
            }
        }
        if !current.agents.is_empty() {
            groups.push(current);
        }
        Self { groups }
    }

    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let agent = user_agent.to_ascii_lowercase();
        let token = agent.split('/').next().unwrap_or_default();
        self.groups
            .iter()
            .find(|g| {
                g.agents
                    .iter()
                    .any(|a| a != "*" && !token.is_empty() && token.contains(a.as_str()))
            })
            .or_else(|| self.groups.iter().find(|g| g.agents.iter().any(|a| a == "*")))
    }

    /// Whether `user_agent` may fetch `url`. The longest matching rule
    /// decides; on a tie Allow wins.
    pub fn can_fetch(&self, user_agent: &str, url: &Url) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };
        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        group
            .rules
            .iter()
            .filter(|r| r.pattern.is_match(&target))
            .max_by(|a, b| a.len.cmp(&b.len).then(a.allow.cmp(&b.allow)))
            .map_or(true, |r| r.allow)
    }
}

/// Parsed robots files per origin, refreshed after `ttl`.
#[derive(Debug)]
pub struct RobotsCache {
    ttl: Duration,
    entries: RefCell<HashMap<String, (Instant, RobotsRules)>>,
}

impl RobotsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RefCell::new(HashMap::new()),
        }
    }

    pub fn origin_of(url: &Url) -> String {
        url.origin().ascii_serialization()
    }

    pub fn get(&self, origin: &str) -> Option<RobotsRules> {
        let entries = self.entries.borrow();
        let (fetched, rules) = entries.get(origin)?;
        if fetched.elapsed() > self.ttl {
            debug!(origin, "robots entry is stale");
            return None;
        }
        Some(rules.clone())
    }

    pub fn insert(&self, origin: &str, rules: RobotsRules) {
        self.entries
            .borrow_mut()
            .insert(origin.to_string(), (Instant::now(), rules));
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "\
# comment
User-agent: badbot
Disallow: /

User-agent: *
Disallow: /private
Allow: /private/open
Disallow: /*.pdf$
";

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_longest_rule_wins() {
        let rules = RobotsRules::parse(ROBOTS);
        let ua = "testbrowser/0.1";
        assert!(rules.can_fetch(ua, &url("http://h/")));
        assert!(!rules.can_fetch(ua, &url("http://h/private/x")));
        assert!(rules.can_fetch(ua, &url("http://h/private/open/x")));
        assert!(!rules.can_fetch(ua, &url("http://h/doc.pdf")));
        assert!(rules.can_fetch(ua, &url("http://h/doc.pdf?x=1")));
    }

    #[test]
    fn test_specific_agent_group() {
        let rules = RobotsRules::parse(ROBOTS);
        assert!(!rules.can_fetch("BadBot/2.0", &url("http://h/")));
        assert!(RobotsRules::allow_all().can_fetch("x", &url("http://h/a")));
        assert!(!RobotsRules::disallow_all().can_fetch("x", &url("http://h/a")));
    }

    #[test]
    fn test_cache_ttl() {
        let cache = RobotsCache::new(Duration::from_secs(60));
        let origin = RobotsCache::origin_of(&url("http://h:8080/a"));
        assert_eq!(origin, "http://h:8080");
        assert!(cache.get(&origin).is_none());
        cache.insert(&origin, RobotsRules::disallow_all());
        assert!(cache.get(&origin).is_some());

        let expired = RobotsCache::new(Duration::ZERO);
        expired.insert(&origin, RobotsRules::allow_all());
        std::thread::sleep(Duration::from_millis(5));
        assert!(expired.get(&origin).is_none());
    }
}
