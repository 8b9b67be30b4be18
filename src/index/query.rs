//! Query planning over the index: include/exclude predicates compose into
//! an immutable, sorted, deduplicated sequence of byte ranges.

use nom::bytes::complete::take_while1;
use nom::character::complete::{char, digit1};
use nom::combinator::{map_res, opt};
use nom::IResult;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;

use crate::error::{BgenError, Result};
use crate::index::store::IndexStore;

/// A closed chromosome/position interval. Either bound may be omitted in
/// the textual form `chr:start-end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub chromosome: String,
    pub start: u32,
    pub end: u32,
}

fn range_parser(input: &str) -> IResult<&str, Range> {
    let (input, chromosome) = take_while1(|c| c != ':')(input)?;
    let (input, _) = char(':')(input)?;
    let (input, start) = opt(map_res(digit1, str::parse::<u32>))(input)?;
    let (input, _) = char('-')(input)?;
    let (input, end) = opt(map_res(digit1, str::parse::<u32>))(input)?;
    Ok((
        input,
        Range {
            chromosome: chromosome.to_string(),
            start: start.unwrap_or(0),
            end: end.unwrap_or(u32::MAX),
        },
    ))
}

impl Range {
    /// Parses the `<chr>:<pos1>-<pos2>` form; either position may be
    /// omitted.
    pub fn parse(text: &str) -> Result<Range> {
        match range_parser(text) {
            Ok(("", range)) => Ok(range),
            _ => Err(BgenError::OptionError(format!(
                "'{text}' is not a range of the form chr:start-end"
            ))),
        }
    }
}

/// Mutable predicate set over one index; freezes into a [`Plan`].
pub struct VariantQuery {
    store: IndexStore,
    incl_ranges: Vec<Range>,
    excl_ranges: Vec<Range>,
    incl_rsids: Vec<String>,
    excl_rsids: Vec<String>,
}

impl VariantQuery {
    pub fn new(store: IndexStore) -> VariantQuery {
        VariantQuery {
            store,
            incl_ranges: Vec::new(),
            excl_ranges: Vec::new(),
            incl_rsids: Vec::new(),
            excl_rsids: Vec::new(),
        }
    }

    pub fn include_range(&mut self, range: Range) -> &mut Self {
        self.incl_ranges.push(range);
        self
    }

    pub fn exclude_range(&mut self, range: Range) -> &mut Self {
        self.excl_ranges.push(range);
        self
    }

    pub fn include_rsids(&mut self, ids: impl IntoIterator<Item = String>) -> &mut Self {
        self.incl_rsids.extend(ids);
        self
    }

    pub fn exclude_rsids(&mut self, ids: impl IntoIterator<Item = String>) -> &mut Self {
        self.excl_rsids.extend(ids);
        self
    }

    fn predicate_sql(
        ranges: &[Range],
        rsids: &[String],
        params: &mut Vec<SqlValue>,
    ) -> Vec<String> {
        let mut conditions = Vec::new();
        for range in ranges {
            conditions.push("(chromosome = ? AND position >= ? AND position <= ?)".to_string());
            params.push(SqlValue::Text(range.chromosome.clone()));
            params.push(SqlValue::Integer(range.start as i64));
            params.push(SqlValue::Integer(range.end as i64));
        }
        if !rsids.is_empty() {
            let placeholders = vec!["?"; rsids.len()].join(", ");
            conditions.push(format!("rsid IN ({placeholders})"));
            params.extend(rsids.iter().cloned().map(SqlValue::Text));
        }
        conditions
    }

    /// Materializes the plan: the union of the include predicates (or all
    /// variants when there are none), minus the union of the exclude
    /// predicates, ordered by file offset and deduplicated.
    pub fn initialise(&self) -> Result<Plan> {
        let mut params: Vec<SqlValue> = Vec::new();
        let includes = Self::predicate_sql(&self.incl_ranges, &self.incl_rsids, &mut params);
        let excludes = Self::predicate_sql(&self.excl_ranges, &self.excl_rsids, &mut params);
        let mut sql = format!(
            "SELECT file_start_position, size_in_bytes FROM {}",
            self.store.table()
        );
        let mut clauses = Vec::new();
        if !includes.is_empty() {
            clauses.push(format!("({})", includes.join(" OR ")));
        }
        if !excludes.is_empty() {
            clauses.push(format!("NOT ({})", excludes.join(" OR ")));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY file_start_position");

        let conn = self.store.connection();
        let mut statement = conn.prepare(&sql)?;
        let rows = statement.query_map(params_from_iter(params), |row| {
            Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64))
        })?;
        let mut entries: Vec<(u64, u64)> = Vec::new();
        for row in rows {
            let entry = row?;
            // The primary key can yield one variant twice under alternative
            // allele representations; identical ranges collapse here.
            if entries.last() == Some(&entry) {
                continue;
            }
            entries.push(entry);
        }
        Ok(Plan { entries })
    }
}

/// An immutable, eagerly materialized query result: byte ranges into the
/// data file, strictly ascending by start offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    entries: Vec<(u64, u64)>,
}

impl Plan {
    pub fn number_of_variants(&self) -> usize {
        self.entries.len()
    }

    pub fn locate_variant(&self, i: usize) -> Option<(u64, u64)> {
        self.entries.get(i).copied()
    }

    pub fn entries(&self) -> &[(u64, u64)] {
        &self.entries
    }
}
