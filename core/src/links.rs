//! Anchor extraction and the document link graph fed to PageRank.

use crate::{DocId, Document};
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

lazy_static! {
    static ref ANCHOR: Selector = Selector::parse("a[href]").expect("valid selector");
}

/// Absolute http(s) targets of every `<a href>` in the document's content. Relative hrefs
/// resolve against the document URL; unparseable ones are logged and skipped.
pub fn extract_links(doc: &Document) -> Vec<Url> {
    let base = match Url::parse(&doc.url) {
        Ok(u) => Some(u),
        Err(e) => {
            tracing::debug!(doc_id = doc.id, url = %doc.url, error = %e, "document url is not absolute");
            None
        }
    };
    let html = Html::parse_document(&doc.content);
    let mut out = Vec::new();
    for a in html.select(&ANCHOR) {
        let Some(href) = a.value().attr("href") else { continue };
        let parsed = Url::parse(href).or_else(|e| match &base {
            Some(b) => b.join(href),
            None => Err(e),
        });
        match parsed {
            Ok(mut u) if u.scheme().starts_with("http") => {
                u.set_fragment(None);
                out.push(u);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(doc_id = doc.id, href, error = %e, "skipping malformed link"),
        }
    }
    out
}

/// Directed link graph. `incoming[n]` lists the nodes linking to `n`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkGraph {
    nodes: BTreeSet<DocId>,
    incoming: BTreeMap<DocId, Vec<DocId>>,
    out_degree: BTreeMap<DocId, usize>,
}

impl LinkGraph {
    pub fn new() -> Self { Self::default() }

    pub fn add_node(&mut self, id: DocId) { self.nodes.insert(id); }

    /// Add `from -> to`. Self links and repeated edges are ignored.
    pub fn add_edge(&mut self, from: DocId, to: DocId) -> bool {
        self.nodes.insert(from);
        self.nodes.insert(to);
        if from == to { return false; }
        let sources = self.incoming.entry(to).or_default();
        if sources.contains(&from) { return false; }
        sources.push(from);
        *self.out_degree.entry(from).or_insert(0) += 1;
        true
    }

    pub fn nodes(&self) -> impl Iterator<Item = DocId> + '_ { self.nodes.iter().copied() }
    pub fn node_count(&self) -> usize { self.nodes.len() }
    pub fn edge_count(&self) -> usize { self.out_degree.values().sum() }

    pub fn incoming(&self, id: DocId) -> &[DocId] {
        self.incoming.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn out_degree(&self, id: DocId) -> usize { self.out_degree.get(&id).copied().unwrap_or(0) }

    /// Graph over `docs`, resolving each extracted link with `resolve` (url -> known doc).
    /// Every document is a node even without links.
    pub fn from_documents<F>(docs: &[Document], resolve: F) -> Self
    where
        F: Fn(&str) -> Option<DocId>,
    {
        let mut graph = LinkGraph::new();
        for doc in docs {
            graph.add_node(doc.id);
            for link in extract_links(doc) {
                if let Some(target) = resolve(link.as_str()) {
                    graph.add_edge(doc.id, target);
                }
            }
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_absolute_and_relative_links() {
        let doc = Document::new(
            1,
            "http://example.com/dir/page.html",
            "t",
            r##"<p><a href="http://other.org/x">x</a> <a href="next.html#top">n</a>
               <a href="mailto:me@example.com">m</a> <a name="anchor">no href</a></p>"##,
        );
        let links: Vec<String> = extract_links(&doc).into_iter().map(String::from).collect();
        assert_eq!(links, vec!["http://other.org/x", "http://example.com/dir/next.html"]);
    }

    #[test]
    fn relative_links_need_an_absolute_base() {
        let doc = Document::new(1, "not a url", "t", r#"<a href="page.html">p</a><a href="https://ok.io/">ok</a>"#);
        let links: Vec<String> = extract_links(&doc).into_iter().map(String::from).collect();
        assert_eq!(links, vec!["https://ok.io/"]);
    }

    #[test]
    fn graph_tracks_incoming_and_out_degree() {
        let mut g = LinkGraph::new();
        assert!(g.add_edge(1, 2));
        assert!(g.add_edge(3, 2));
        assert!(!g.add_edge(1, 2));
        assert!(!g.add_edge(2, 2));
        g.add_node(4);
        assert_eq!(g.incoming(2), &[1, 3]);
        assert_eq!(g.out_degree(1), 1);
        assert_eq!(g.out_degree(2), 0);
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn resolves_links_to_known_documents() {
        let docs = vec![
            Document::new(1, "http://a.test/", "a", r#"<a href="http://b.test/">b</a><a href="http://zzz.test/">?</a>"#),
            Document::new(2, "http://b.test/", "b", r#"<a href="/">home</a>"#),
        ];
        let g = LinkGraph::from_documents(&docs, |u| match u {
            "http://a.test/" => Some(1),
            "http://b.test/" => Some(2),
            _ => None,
        });
        assert_eq!(g.incoming(2), &[1]);
        assert_eq!(g.out_degree(1), 1);
        // "/" on b.test resolves to b itself
        assert_eq!(g.out_degree(2), 0);
    }
}
