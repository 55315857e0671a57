use crate::composer::{KeywordItem, NewsletterContext, PostItem, ProposalItem};
use std::fmt::Write as _;

const STYLE: &str = "body{font-family:Arial,sans-serif;line-height:1.6;color:#333;max-width:800px;margin:0 auto;padding:20px}\
.header{text-align:center;margin-bottom:30px;border-bottom:2px solid #E6007A;padding-bottom:20px}\
h1{color:#E6007A}h2{color:#E6007A;border-bottom:1px solid #eee;padding-bottom:10px}\
.date{color:#666;font-style:italic}.section{margin-bottom:30px}\
.summary-box{background-color:#f0f0f0;border-left:4px solid #E6007A;padding:15px;margin:20px 0}\
.keyword{background-color:#E6007A20;color:#E6007A;padding:5px 10px;border-radius:15px;font-size:14px;margin-right:6px}\
.post,.governance-item{margin-bottom:15px;padding-bottom:15px;border-bottom:1px dashed #ddd}\
.post-title{font-weight:bold;font-size:18px}.post-meta{font-size:14px;color:#666}\
.post-link{color:#E6007A;font-weight:bold;text-decoration:none}\
.footer{margin-top:50px;padding-top:20px;border-top:1px solid #ddd;font-size:14px;color:#666;text-align:center}\
.unsubscribe{color:#999;font-size:12px}";

/// Renders a [`NewsletterContext`] to a standalone HTML document.
#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer;

impl HtmlRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, context: &NewsletterContext) -> String {
        let mut html = String::with_capacity(8 * 1024);
        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
             <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
             <div class=\"header\">\n<h1>{title}</h1>\n<p class=\"date\">{date}</p>\n</div>\n",
            title = escape(&context.title),
            date = escape(&context.date),
        );

        if !context.community_summary.trim().is_empty() {
            let _ = write!(
                html,
                "<div class=\"section\">\n<h2>Community Summary</h2>\n\
                 <div class=\"summary-box\"><p>{}</p></div>\n</div>\n",
                escape(&context.community_summary)
            );
        }
        if let Some(keywords) = non_empty(&context.trending_keywords) {
            render_keywords(&mut html, keywords);
        }
        if let Some(posts) = non_empty(&context.important_posts) {
            render_posts(&mut html, posts);
        }
        if let Some(proposals) = non_empty(&context.governance_proposals) {
            render_proposals(&mut html, proposals);
        }

        let _ = write!(
            html,
            "<div class=\"footer\">\n<p>Polkadot Community Digest</p>\n\
             <p class=\"unsubscribe\">If you no longer wish to receive these emails, \
             <a href=\"{}\">click here to unsubscribe</a>.</p>\n</div>\n</body>\n</html>\n",
            escape(&context.unsubscribe_link)
        );
        html
    }
}

fn non_empty<T>(section: &Option<Vec<T>>) -> Option<&[T]> {
    section.as_deref().filter(|items| !items.is_empty())
}

fn render_keywords(html: &mut String, keywords: &[KeywordItem]) {
    html.push_str("<div class=\"section\">\n<h2>Trending Topics</h2>\n<div>\n");
    for keyword in keywords {
        let _ = writeln!(
            html,
            "<span class=\"keyword\">{} ({})</span>",
            escape(&keyword.word),
            keyword.count
        );
    }
    html.push_str("</div>\n</div>\n");
}

fn render_posts(html: &mut String, posts: &[PostItem]) {
    html.push_str("<div class=\"section\">\n<h2>Key Posts of the Week</h2>\n");
    for post in posts {
        let _ = write!(
            html,
            "<div class=\"post\">\n<div class=\"post-title\">{}</div>\n\
             <div class=\"post-meta\">By <strong>{}</strong> on {} | {} views | {} replies</div>\n\
             <div class=\"post-summary\">{}</div>\n",
            escape(&post.title),
            escape(&post.author),
            escape(&post.date),
            post.views,
            post.replies,
            escape(&post.summary)
        );
        if let Some(url) = post.url.as_deref() {
            let _ = writeln!(
                html,
                "<a href=\"{}\" class=\"post-link\">Read more &raquo;</a>",
                escape(url)
            );
        }
        html.push_str("</div>\n");
    }
    html.push_str("</div>\n");
}

fn render_proposals(html: &mut String, proposals: &[ProposalItem]) {
    html.push_str("<div class=\"section\">\n<h2>Active Governance Proposals</h2>\n");
    for proposal in proposals {
        let _ = write!(
            html,
            "<div class=\"governance-item\">\n<div class=\"post-title\">{}</div>\n",
            escape(&proposal.title)
        );
        if !proposal.date.is_empty() {
            let _ = writeln!(
                html,
                "<div class=\"post-meta\">Submitted at {}</div>",
                escape(&proposal.date)
            );
        }
        let _ = writeln!(
            html,
            "<div class=\"post-summary\">{}</div>",
            escape(&proposal.summary)
        );
        if let Some(url) = proposal.url.as_deref() {
            let _ = writeln!(
                html,
                "<a href=\"{}\" class=\"post-link\">View complete proposal &raquo;</a>",
                escape(url)
            );
        }
        html.push_str("</div>\n");
    }
    html.push_str("</div>\n");
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
