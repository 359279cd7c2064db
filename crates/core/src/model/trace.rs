use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::TraceParseError;
use crate::ids::{SpanId, TraceId};
use crate::model::span::{Span, SpanRecord};

/// A trace assembled into a span tree.
///
/// Spans live in an arena; parent/child links are arena indices and
/// `span(id)` resolves through an id map. Built once per payload and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    trace_id: TraceId,
    spans: Vec<Span>,
    roots: Vec<usize>,
    orphaned: Vec<usize>,
    start_time_unix_ms: f64,
    end_time_unix_ms: f64,
    #[serde(skip)]
    index: HashMap<SpanId, usize>,
}

impl Trace {
    /// Links flattened span records into a tree.
    ///
    /// Records keep their payload order: children are attached in that order
    /// and roots are listed in that order. A span whose parent id does not
    /// resolve inside the payload becomes a root and is reported by
    /// [`Trace::orphaned`]. Duplicate span ids are rejected.
    pub fn build(records: Vec<SpanRecord>) -> Result<Self, TraceParseError> {
        let Some(first) = records.first() else {
            return Err(TraceParseError::Empty);
        };
        let trace_id = first.trace_id.clone();

        let mut index: HashMap<SpanId, usize> = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            validate_record(record, &trace_id)?;
            if let Some(&prev) = index.get(&record.span_id) {
                return Err(TraceParseError::DuplicateSpanId {
                    span_id: record.span_id.to_string(),
                    location: record.location,
                    first: records[prev].location,
                });
            }
            index.insert(record.span_id.clone(), i);
        }

        let mut spans: Vec<Span> = records.into_iter().map(Span::from).collect();
        let mut roots = Vec::new();
        let mut orphaned = Vec::new();

        for i in 0..spans.len() {
            let Some(parent_id) = spans[i].parent_span_id.as_ref() else {
                roots.push(i);
                continue;
            };
            match index.get(parent_id).copied() {
                Some(p) if p != i => {
                    spans[i].parent = Some(p);
                    spans[p].children.push(i);
                }
                _ => {
                    roots.push(i);
                    orphaned.push(i);
                }
            }
        }

        break_parent_cycles(&mut spans, &mut roots, &mut orphaned);

        if !orphaned.is_empty() {
            warn!(
                trace_id = %trace_id,
                orphaned = orphaned.len(),
                "spans with unresolved parent promoted to root"
            );
        }

        let mut start_time_unix_ms = f64::INFINITY;
        let mut end_time_unix_ms = f64::NEG_INFINITY;
        for span in &mut spans {
            start_time_unix_ms = start_time_unix_ms.min(span.start_time_unix_ms);
            end_time_unix_ms = end_time_unix_ms.max(span.end_time_unix_ms);
            span.events
                .sort_by(|a, b| a.time_unix_ms.total_cmp(&b.time_unix_ms));
        }

        debug!(
            trace_id = %trace_id,
            spans = spans.len(),
            roots = roots.len(),
            "trace model built"
        );

        Ok(Self {
            trace_id,
            spans,
            roots,
            orphaned,
            start_time_unix_ms,
            end_time_unix_ms,
            index,
        })
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    pub fn start_time_unix_ms(&self) -> f64 {
        self.start_time_unix_ms
    }

    pub fn end_time_unix_ms(&self) -> f64 {
        self.end_time_unix_ms
    }

    pub fn duration_ms(&self) -> f64 {
        self.end_time_unix_ms - self.start_time_unix_ms
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// All spans in payload order.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn span(&self, id: &SpanId) -> Option<&Span> {
        self.index.get(id).map(|&i| &self.spans[i])
    }

    pub fn index_of(&self, id: &SpanId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, index: usize) -> Option<&Span> {
        self.spans.get(index)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Span> {
        self.roots.iter().map(|&i| &self.spans[i])
    }

    pub fn root_indices(&self) -> &[usize] {
        &self.roots
    }

    /// Spans whose declared parent was missing from the payload.
    pub fn orphaned(&self) -> impl Iterator<Item = &Span> {
        self.orphaned.iter().map(|&i| &self.spans[i])
    }

    pub fn orphaned_count(&self) -> usize {
        self.orphaned.len()
    }

    pub fn parent(&self, span: &Span) -> Option<&Span> {
        span.parent.map(|i| &self.spans[i])
    }

    /// Children ordered by start time; ties keep payload order.
    pub fn children(&self, span: &Span) -> Vec<&Span> {
        self.sorted_by_start(&span.children)
            .into_iter()
            .map(|i| &self.spans[i])
            .collect()
    }

    /// Earliest-starting root, which is what trace summaries are named after.
    pub fn root_span(&self) -> Option<&Span> {
        self.sorted_by_start(&self.roots)
            .first()
            .map(|&i| &self.spans[i])
    }

    /// Depth-first pre-order walk yielding `(depth, span)`, siblings ordered
    /// by start time. This is the row order of the Gantt table.
    pub fn walk(&self) -> Vec<(usize, &Span)> {
        let mut out = Vec::with_capacity(self.spans.len());
        let mut stack: Vec<(usize, usize)> = self
            .sorted_by_start(&self.roots)
            .into_iter()
            .rev()
            .map(|i| (0, i))
            .collect();

        while let Some((depth, i)) = stack.pop() {
            let span = &self.spans[i];
            out.push((depth, span));
            for child in self.sorted_by_start(&span.children).into_iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }

    /// Distinct service names in payload order.
    pub fn services(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.spans
            .iter()
            .map(|s| s.service_name())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.spans.iter().filter(|s| s.is_error()).count()
    }

    fn sorted_by_start(&self, indices: &[usize]) -> Vec<usize> {
        let mut sorted = indices.to_vec();
        sorted.sort_by(|a, b| {
            self.spans[*a]
                .start_time_unix_ms
                .total_cmp(&self.spans[*b].start_time_unix_ms)
        });
        sorted
    }
}

fn validate_record(record: &SpanRecord, trace_id: &TraceId) -> Result<(), TraceParseError> {
    if &record.trace_id != trace_id {
        return Err(TraceParseError::MixedTraceIds {
            span_id: record.span_id.to_string(),
            location: record.location,
            expected: trace_id.to_string(),
            found: record.trace_id.to_string(),
        });
    }

    for (field, value) in [
        ("startTimeUnixNano", record.start_time_unix_ms),
        ("endTimeUnixNano", record.end_time_unix_ms),
    ] {
        if value == 0.0 {
            return Err(TraceParseError::MissingField {
                location: record.location,
                field,
            });
        }
        if !value.is_finite() || value < 0.0 {
            return Err(TraceParseError::InvalidField {
                location: record.location,
                field,
                reason: format!("not a valid timestamp: {value}"),
            });
        }
    }

    if record.end_time_unix_ms < record.start_time_unix_ms {
        return Err(TraceParseError::EndBeforeStart {
            location: record.location,
            span_id: record.span_id.to_string(),
            start_ms: record.start_time_unix_ms,
            end_ms: record.end_time_unix_ms,
        });
    }
    Ok(())
}

/// Parent links that loop back on themselves leave spans unreachable from
/// any root. Each loop is cut at its first span in payload order, which is
/// then treated like any other span with an unresolvable parent.
fn break_parent_cycles(spans: &mut [Span], roots: &mut Vec<usize>, orphaned: &mut Vec<usize>) {
    let mut reachable = vec![false; spans.len()];
    let mut stack: Vec<usize> = roots.clone();
    mark_reachable(spans, &mut reachable, &mut stack);

    let mut promoted = false;
    for i in 0..spans.len() {
        if reachable[i] {
            continue;
        }
        if let Some(p) = spans[i].parent.take() {
            spans[p].children.retain(|&c| c != i);
        }
        roots.push(i);
        orphaned.push(i);
        promoted = true;
        stack.push(i);
        mark_reachable(spans, &mut reachable, &mut stack);
    }

    if promoted {
        warn!("span parent references form a cycle; cycle broken at first span");
        roots.sort_unstable();
        orphaned.sort_unstable();
    }
}

fn mark_reachable(spans: &[Span], reachable: &mut [bool], stack: &mut Vec<usize>) {
    while let Some(i) = stack.pop() {
        if reachable[i] {
            continue;
        }
        reachable[i] = true;
        stack.extend(spans[i].children.iter().copied());
    }
}
