//! Minimal robots.txt parsing for the crawl-politeness check.
//!
//! The parser walks the file line by line, tracking whether the current
//! `User-agent` block applies to us (a literal `*` or a case-insensitive
//! substring match against our agent string) and accumulating the
//! `Allow`/`Disallow` path prefixes of every applicable block.
//!
//! Resolution order for a requested path: any matching `Allow` prefix
//! permits it; otherwise any matching `Disallow` prefix forbids it;
//! otherwise it is permitted. Politeness is advisory, not a security
//! boundary, so an absent or unreadable robots.txt permits everything.

/// Allow/Disallow prefixes that apply to our crawler.
#[derive(Debug, Default, Clone)]
pub struct RobotsTxt {
    allow: Vec<String>,
    disallow: Vec<String>,
}

impl RobotsTxt {
    /// Parse robots.txt content, keeping only the rules addressed to
    /// `user_agent` (or to `*`).
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let agent_lower = user_agent.to_lowercase();
        let mut rules = RobotsTxt::default();

        // True while the block being read applies to us. Consecutive
        // User-agent lines extend one block; a rule line ends the list.
        let mut applies = false;
        let mut in_agent_list = false;

        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before.trim(),
                None => line.trim(),
            };
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !in_agent_list {
                        applies = false;
                        in_agent_list = true;
                    }
                    let value_lower = value.to_lowercase();
                    if value == "*" || agent_lower.contains(&value_lower) {
                        applies = true;
                    }
                }
                "allow" => {
                    in_agent_list = false;
                    if applies && !value.is_empty() {
                        rules.allow.push(value.to_string());
                    }
                }
                "disallow" => {
                    in_agent_list = false;
                    // An empty Disallow means "allow everything".
                    if applies && !value.is_empty() {
                        rules.disallow.push(value.to_string());
                    }
                }
                _ => {
                    in_agent_list = false;
                }
            }
        }

        rules
    }

    /// Whether fetching `path` is permitted for our agent.
    pub fn is_allowed(&self, path: &str) -> bool {
        if self.allow.iter().any(|p| path.starts_with(p.as_str())) {
            return true;
        }
        !self.disallow.iter().any(|p| path.starts_with(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "hackathon-radar/0.1 (+mailto:crawler@awfulsec.com)";

    #[test]
    fn test_wildcard_disallow_applies() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /hackathons\n", AGENT);
        assert!(!robots.is_allowed("/hackathons"));
        assert!(!robots.is_allowed("/hackathons/ai-hack"));
        assert!(robots.is_allowed("/about"));
    }

    #[test]
    fn test_allow_overrides_disallow() {
        let robots = RobotsTxt::parse(
            "User-agent: *\nAllow: /hackathons/public\nDisallow: /hackathons\n",
            AGENT,
        );
        assert!(robots.is_allowed("/hackathons/public/ai-hack"));
        assert!(!robots.is_allowed("/hackathons/private"));
    }

    #[test]
    fn test_block_for_other_agent_ignored() {
        let robots = RobotsTxt::parse(
            "User-agent: Googlebot\nDisallow: /hackathons\n\nUser-agent: *\nDisallow: /admin\n",
            AGENT,
        );
        assert!(robots.is_allowed("/hackathons"));
        assert!(!robots.is_allowed("/admin"));
    }

    #[test]
    fn test_agent_substring_match_is_case_insensitive() {
        let robots = RobotsTxt::parse(
            "User-agent: Hackathon-Radar\nDisallow: /api\n",
            AGENT,
        );
        assert!(!robots.is_allowed("/api/hackathons"));
    }

    #[test]
    fn test_consecutive_agent_lines_share_rules() {
        let robots = RobotsTxt::parse(
            "User-agent: Googlebot\nUser-agent: *\nDisallow: /private\n",
            AGENT,
        );
        assert!(!robots.is_allowed("/private"));
    }

    #[test]
    fn test_rule_line_starts_a_new_block() {
        // The * block's rules must not leak into the Googlebot-only block.
        let robots = RobotsTxt::parse(
            "User-agent: *\nDisallow: /a\n\nUser-agent: Googlebot\nDisallow: /b\n",
            AGENT,
        );
        assert!(!robots.is_allowed("/a"));
        assert!(robots.is_allowed("/b"));
    }

    #[test]
    fn test_empty_disallow_and_comments_ignored() {
        let robots = RobotsTxt::parse(
            "# welcome crawlers\nUser-agent: *\nDisallow:\nCrawl-delay: 10\n",
            AGENT,
        );
        assert!(robots.is_allowed("/anything"));
    }

    #[test]
    fn test_empty_file_permits_everything() {
        let robots = RobotsTxt::parse("", AGENT);
        assert!(robots.is_allowed("/hackathons"));
    }
}
