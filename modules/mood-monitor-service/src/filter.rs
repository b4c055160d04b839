//! Decides whether a fetched tweet is worth a sentiment call.

use crate::config::CollectPolicy;
use crate::twitter_api::SourceTweet;

/// Text length left once URL tokens, hashtags and mention handles are removed.
/// Measured in bytes, like the lengths of the tokens it subtracts.
pub fn signal_length(tweet: &SourceTweet) -> usize {
    let entities = &tweet.entities;
    let boilerplate: usize = entities.urls.iter().map(|u| u.url.len()).sum::<usize>()
        + entities.hashtags.iter().map(|h| h.tag.len()).sum::<usize>()
        + entities.mentions.iter().map(|m| m.tag.len()).sum::<usize>();
    tweet.text.len().saturating_sub(boilerplate)
}

fn links_blocked_domain(tweet: &SourceTweet, blocked: &[String]) -> bool {
    tweet.entities.urls.iter().any(|url| {
        let expanded = url.expanded_url.to_lowercase();
        blocked.iter().any(|domain| expanded.contains(domain.as_str()))
    })
}

pub fn should_detect(tweet: &SourceTweet, policy: &CollectPolicy) -> bool {
    if links_blocked_domain(tweet, &policy.blocked_domains) {
        return false;
    }
    signal_length(tweet) >= policy.min_signal_len
}
