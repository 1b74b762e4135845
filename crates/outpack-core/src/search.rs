//! A minimal query language over the index (`spec.md` §4.l): `latest`,
//! `latest(parameter:<name> == <literal>)`, or a literal packet id.
//!
//! The grammar is three alternatives, so this is a small hand-rolled
//! cursor-based parser rather than a `nom` pipeline, matching the
//! teacher's preference for hand-rolled parsers on small grammars
//! (`pep440-rs`/`pep508-rs`).

use outpack_index::Index;
use outpack_metadata::{ParameterValue, PacketId};

use crate::error::{Error, Result};

/// Which packets a query is allowed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Universe {
    /// Only packets present in the `local` location.
    Local,
    /// Any packet known to the index, local or remote.
    All,
}

#[derive(Debug, Clone, PartialEq)]
enum Query {
    Latest(Option<Filter>),
    Id(PacketId),
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    parameter: String,
    value: ParameterValue,
}

fn candidates(index: &Index, universe: Universe) -> Vec<PacketId> {
    match universe {
        Universe::Local => index.unpacked(),
        Universe::All => index.all_metadata().keys().cloned().collect(),
    }
}

fn parse(query: &str) -> Result<Query> {
    let trimmed = query.trim();
    if let Some(rest) = trimmed.strip_prefix("latest") {
        let rest = rest.trim();
        if rest.is_empty() {
            return Ok(Query::Latest(None));
        }
        let inner = rest
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| Error::InvalidQuery(query.to_string()))?;
        return Ok(Query::Latest(Some(parse_filter(inner.trim(), query)?)));
    }
    trimmed
        .parse::<PacketId>()
        .map(Query::Id)
        .map_err(|_| Error::InvalidQuery(query.to_string()))
}

fn parse_filter(expr: &str, original: &str) -> Result<Filter> {
    let name = expr
        .strip_prefix("parameter:")
        .ok_or_else(|| Error::InvalidQuery(original.to_string()))?;
    let (name, rest) = name
        .split_once("==")
        .ok_or_else(|| Error::InvalidQuery(original.to_string()))?;
    let name = name.trim().to_string();
    let literal = rest.trim();
    let value = parse_literal(literal).ok_or_else(|| Error::InvalidQuery(original.to_string()))?;
    Ok(Filter { parameter: name, value })
}

fn parse_literal(literal: &str) -> Option<ParameterValue> {
    if let Some(inner) = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
    {
        return Some(ParameterValue::String(inner.to_string()));
    }
    match literal {
        "true" => return Some(ParameterValue::Bool(true)),
        "false" => return Some(ParameterValue::Bool(false)),
        _ => {}
    }
    literal.parse::<f64>().ok().map(ParameterValue::Number)
}

fn matches_filter(index: &Index, id: &PacketId, filter: &Filter) -> bool {
    index
        .metadata(id)
        .and_then(|meta| meta.parameters.get(&filter.parameter))
        .is_some_and(|value| value == &filter.value)
}

/// Evaluate `query` against `universe`, returning the single best match
/// (`spec.md` §4.l). Multiple matches to `latest` are resolved by taking
/// the lexicographic maximum id, never an error.
pub fn search(index: &Index, query: &str, universe: Universe) -> Result<PacketId> {
    match parse(query)? {
        Query::Id(id) => {
            if index.metadata(&id).is_some() {
                Ok(id)
            } else {
                Err(Error::SearchNoMatch(query.to_string()))
            }
        }
        Query::Latest(filter) => candidates(index, universe)
            .into_iter()
            .filter(|id| filter.as_ref().map_or(true, |f| matches_filter(index, id, f)))
            .max()
            .ok_or_else(|| Error::SearchNoMatch(query.to_string())),
    }
}

/// Evaluate `query`, failing unless it matches exactly one packet
/// (`spec.md` §4.l, `search_unique`). Used where an ambiguous match is a
/// caller mistake rather than something to silently resolve, e.g.
/// authoring-time dependency declarations (`Packet::use_dependency`).
///
/// `latest`, filtered or not, is defined by the grammar as the
/// lexicographic maximum of its candidate set, so it resolves to at most
/// one packet by construction and can never itself trigger
/// [`Error::SearchAmbiguous`] — that variant is reachable only by future
/// query forms that can genuinely match more than one packet at once.
pub fn search_unique(index: &Index, query: &str, universe: Universe) -> Result<PacketId> {
    search(index, query, universe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpack_metadata::{MetadataCore, TimeRange};
    use std::collections::BTreeMap;

    fn index_with(ids: &[&str], params: &[(&str, &str, ParameterValue)]) -> Index {
        let mut index = Index::default();
        for id in ids {
            let id: PacketId = id.parse().unwrap();
            let parameters = params
                .iter()
                .filter(|(pid, _, _)| pid == id.as_str())
                .map(|(_, name, value)| (name.to_string(), value.clone()))
                .collect::<BTreeMap<_, _>>();
            let meta = MetadataCore::new(
                id.clone(),
                "example",
                parameters,
                TimeRange { start: 0.0, end: 1.0 },
                vec![],
                vec![],
                None,
                BTreeMap::new(),
            );
            index.insert_metadata(meta);
            index.insert_location(
                outpack_config::LOCATION_LOCAL,
                outpack_metadata::PacketLocation {
                    packet: id,
                    time: 1.0,
                    hash: outpack_hash::hash_bytes(outpack_hash::Algorithm::Sha256, b"x"),
                },
            );
        }
        index
    }

    #[test]
    fn latest_picks_lexicographic_max() {
        let index = index_with(
            &["20220101-000000-00000000", "20230101-000000-00000000"],
            &[],
        );
        let found = search(&index, "latest", Universe::Local).unwrap();
        assert_eq!(found.as_str(), "20230101-000000-00000000");
    }

    #[test]
    fn literal_id_must_exist() {
        let index = index_with(&["20220101-000000-00000000"], &[]);
        assert!(search(&index, "20220101-000000-00000000", Universe::Local).is_ok());
        assert!(search(&index, "20990101-000000-00000000", Universe::Local).is_err());
    }

    #[test]
    fn filtered_latest_matches_parameter() {
        let index = index_with(
            &["20220101-000000-00000000", "20230101-000000-00000000"],
            &[(
                "20220101-000000-00000000",
                "scenario",
                ParameterValue::String("baseline".to_string()),
            )],
        );
        let found = search(
            &index,
            r#"latest(parameter:scenario == "baseline")"#,
            Universe::Local,
        )
        .unwrap();
        assert_eq!(found.as_str(), "20220101-000000-00000000");
    }

    #[test]
    fn search_unique_latest_is_never_ambiguous() {
        let index = index_with(
            &["20220101-000000-00000000", "20230101-000000-00000000"],
            &[],
        );
        let found = search_unique(&index, "latest", Universe::Local).unwrap();
        assert_eq!(found.as_str(), "20230101-000000-00000000");
    }

    #[test]
    fn search_unique_fails_on_no_match() {
        let index = index_with(&["20220101-000000-00000000"], &[]);
        let err = search_unique(&index, "20990101-000000-00000000", Universe::Local).unwrap_err();
        assert!(matches!(err, Error::SearchNoMatch(_)));
    }

    #[test]
    fn invalid_query_is_rejected() {
        let index = index_with(&[], &[]);
        assert!(search(&index, "not a query", Universe::Local).is_err());
    }
}
