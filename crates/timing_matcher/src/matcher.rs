use scope_types::property_map::{keys, PropertyMap, PropertyValue, TimingEventExt};

/// One finalised match: the sample index it is attached to, and the tag's
/// (possibly rewritten) property map.
pub type MatchedTag = (usize, PropertyMap);

/// Everything `TimingMatcher::match_chunk` hands back for one call (§4.4).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub tags: Vec<MatchedTag>,
    pub processed_samples: usize,
    pub processed_tags: usize,
    pub messages: Vec<String>,
}

/// The timing-to-sample matcher.
///
/// Holds only the three-field state carrier described in §4.4: the
/// configured sample rate and timeout, and the `LOCAL-TIME` of the most
/// recently matched tag (telemetry only — it does not feed back into the
/// matching arithmetic, so the reset law in §8 holds trivially).
pub struct TimingMatcher {
    sample_rate_hz: f64,
    timeout_ns: u64,
    last_matched_event_tai_ns: Option<u64>,
}

impl TimingMatcher {
    pub fn new(sample_rate_hz: f64, timeout_ns: u64) -> Self {
        TimingMatcher {
            sample_rate_hz,
            timeout_ns,
            last_matched_event_tai_ns: None,
        }
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn last_matched_event_tai_ns(&self) -> Option<u64> {
        self.last_matched_event_tai_ns
    }

    /// Clears the continuity assumption after a sample drop (§4.4 Reset).
    pub fn reset(&mut self) {
        self.last_matched_event_tai_ns = None;
    }

    fn tolerance_samples(&self) -> i64 {
        (self.timeout_ns as f64 * self.sample_rate_hz / 1e9).ceil() as i64
    }

    /// Fuse one chunk's raw timing events and hardware edges.
    ///
    /// See §4.4 of SPEC_FULL.md for the full rule set; the short version:
    /// each tag's edge-search reference ignores `trigger_offset_ns`, its
    /// reported index and residual apply it, tags and edges are walked
    /// with a single forward cursor, and everything at or past
    /// `chunk_length - ceil(timeout * rate / 1e9)` is left for the next
    /// call.
    pub fn match_chunk(&mut self, tags: &[PropertyMap], edges: &[usize], chunk_length: usize, acq_start_time_ns: i64) -> MatchResult {
        let tol = self.tolerance_samples();
        let chunk_len = chunk_length as i64;
        let settle_threshold: i64 = if chunk_len >= tol { chunk_len - tol } else { chunk_len };

        let edges_were_empty = edges.is_empty();
        let mut edge_cursor: usize = 0;
        let mut output: Vec<MatchedTag> = Vec::new();
        let mut processed_tags = 0usize;
        let mut messages: Vec<String> = Vec::new();
        let mut last_decision_idx: i64 = -1;
        let mut withheld_from = tags.len();

        'tags: for (tag_idx, tag) in tags.iter().enumerate() {
            let local_time = tag.local_time_ns().unwrap_or(0) as i64;
            let local_rel = local_time - acq_start_time_ns;
            let search_ref = (local_rel as f64 * self.sample_rate_hz / 1e9).floor() as i64;
            let offset_ns = tag.trigger_offset_ns().unwrap_or(0.0) as f64;
            let raw_output = (local_rel as f64 + offset_ns) * self.sample_rate_hz / 1e9;
            let output_ref = raw_output.floor() as i64;

            // Tag's corrected position predates this chunk entirely: it was
            // necessarily handled (or lost) by an earlier call.
            if output_ref < 0 {
                processed_tags += 1;
                continue 'tags;
            }
            // Tag is still in the future as far as this chunk can tell;
            // withhold it and everything after it (tags are time-ordered).
            if output_ref >= settle_threshold {
                withheld_from = tag_idx;
                break 'tags;
            }

            // Edges strictly older than this tag's tolerance window can
            // never match anything we have left to process; finalise them.
            while edge_cursor < edges.len() && (edges[edge_cursor] as i64) < search_ref - tol {
                let edge_idx = edges[edge_cursor];
                edge_cursor += 1;
                if (edge_idx as i64) < settle_threshold {
                    output.push(unknown_event(edge_idx, acq_start_time_ns, self.sample_rate_hz));
                    last_decision_idx = last_decision_idx.max(edge_idx as i64);
                }
            }

            if !tag.hw_trigger() {
                output.push((output_ref as usize, rewritten(tag, 0.0)));
                processed_tags += 1;
                last_decision_idx = last_decision_idx.max(output_ref);
                continue 'tags;
            }

            let edge_in_tolerance = edge_cursor < edges.len() && (edges[edge_cursor] as i64 - search_ref).abs() <= tol;
            let attach_idx = if edge_in_tolerance {
                // Ground truth is the pulse: attach at the edge the hardware
                // actually reported, not the WR-computed expectation, and let
                // the residual carry the (signed) leftover skew.
                let matched_edge_index = edges[edge_cursor];
                edge_cursor += 1;
                let residual_seconds = (raw_output - matched_edge_index as f64) / self.sample_rate_hz;
                output.push((matched_edge_index, rewritten(tag, residual_seconds)));
                self.last_matched_event_tai_ns = Some(local_time as u64);
                matched_edge_index as i64
            } else if edges_were_empty {
                messages.push(format!(
                    "event expected at index {output_ref} dropped: no edges supplied this call"
                ));
                output_ref
            } else {
                messages.push(format!(
                    "event expected at index {output_ref} had no pulse within tolerance"
                ));
                let residual_seconds = (raw_output - output_ref as f64) / self.sample_rate_hz;
                output.push((output_ref as usize, rewritten(tag, residual_seconds)));
                output_ref
            };
            processed_tags += 1;
            last_decision_idx = last_decision_idx.max(attach_idx);
        }

        // Expected indices of tags withheld for the next call. An edge that
        // still falls within tolerance of one of these must not be settled
        // here: the settle margin exists precisely so the withheld tag gets
        // a chance to claim it next call.
        let pending_refs: Vec<i64> = tags[withheld_from..]
            .iter()
            .filter(|t| t.hw_trigger())
            .map(|t| {
                let local_time = t.local_time_ns().unwrap_or(0) as i64;
                let local_rel = local_time - acq_start_time_ns;
                let offset_ns = t.trigger_offset_ns().unwrap_or(0.0) as f64;
                ((local_rel as f64 + offset_ns) * self.sample_rate_hz / 1e9).floor() as i64
            })
            .collect();

        // Any edge still unconsumed, inside the settled region, and not
        // within tolerance of a withheld tag never found a tag: it becomes a
        // synthetic UNKNOWN_EVENT.
        while edge_cursor < edges.len() && (edges[edge_cursor] as i64) < settle_threshold {
            let edge_idx = edges[edge_cursor] as i64;
            if pending_refs.iter().any(|r| (edge_idx - r).abs() <= tol) {
                break;
            }
            edge_cursor += 1;
            output.push(unknown_event(edge_idx as usize, acq_start_time_ns, self.sample_rate_hz));
            last_decision_idx = last_decision_idx.max(edge_idx);
        }

        output.sort_by_key(|(idx, _)| *idx);

        let processed_samples = if chunk_len >= tol {
            settle_threshold as usize
        } else {
            last_decision_idx.max(0) as usize
        };

        MatchResult {
            tags: output,
            processed_samples,
            processed_tags,
            messages,
        }
    }
}

fn rewritten(tag: &PropertyMap, residual_seconds: f64) -> PropertyMap {
    let mut out = tag.clone();
    out.set_trigger_offset_seconds(residual_seconds);
    out
}

fn unknown_event(edge_index: usize, acq_start_time_ns: i64, sample_rate_hz: f64) -> MatchedTag {
    let trigger_time = acq_start_time_ns + ((edge_index as f64) * 1e9 / sample_rate_hz).round() as i64;
    let mut meta = PropertyMap::new();
    meta.insert(keys::LOCAL_TIME.to_string(), PropertyValue::U64(trigger_time as u64));
    meta.insert(keys::HW_TRIGGER.to_string(), PropertyValue::Bool(false));

    let mut map = PropertyMap::new();
    map.insert(keys::TRIGGER_NAME.to_string(), PropertyValue::Str("UNKNOWN_EVENT".to_string()));
    map.insert(keys::TRIGGER_TIME.to_string(), PropertyValue::U64(trigger_time as u64));
    map.insert(keys::TRIGGER_OFFSET.to_string(), PropertyValue::F32(0.0));
    map.insert(keys::META.to_string(), PropertyValue::Map(meta));
    (edge_index, map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str, trigger_time_ns: u64, trigger_offset_ns: f32, hw_trigger: bool, local_time_ns: u64) -> PropertyMap {
        let mut meta = PropertyMap::new();
        meta.insert(keys::LOCAL_TIME.to_string(), PropertyValue::U64(local_time_ns));
        meta.insert(keys::HW_TRIGGER.to_string(), PropertyValue::Bool(hw_trigger));

        let mut map = PropertyMap::new();
        map.insert(keys::TRIGGER_NAME.to_string(), PropertyValue::Str(name.to_string()));
        map.insert(keys::TRIGGER_TIME.to_string(), PropertyValue::U64(trigger_time_ns));
        map.insert(keys::TRIGGER_OFFSET.to_string(), PropertyValue::F32(trigger_offset_ns));
        map.insert(keys::META.to_string(), PropertyValue::Map(meta));
        map
    }

    fn indices(result: &MatchResult) -> Vec<usize> {
        result.tags.iter().map(|(idx, _)| *idx).collect()
    }

    fn names(result: &MatchResult) -> Vec<String> {
        result
            .tags
            .iter()
            .map(|(_, m)| m.get(keys::TRIGGER_NAME).and_then(PropertyValue::as_str).unwrap().to_string())
            .collect()
    }

    #[test]
    fn simple_matching() {
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD3", acq as u64 + 200_000, 0.0, true, acq as u64 + 200_000),
        ];
        let edges = vec![100usize, 150, 200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 250, acq);

        assert_eq!(result.processed_tags, 3);
        assert_eq!(result.processed_samples, 240);
        assert_eq!(indices(&result), vec![100, 150, 200]);
        for (_, map) in &result.tags {
            assert_eq!(map.get(keys::TRIGGER_OFFSET).and_then(PropertyValue::as_f32), Some(0.0));
        }
    }

    #[test]
    fn identical_timestamps() {
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2A", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD2B", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD2C", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD3", acq as u64 + 200_000, 0.0, true, acq as u64 + 200_000),
        ];
        let edges = vec![100usize, 150, 200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 250, acq);

        assert_eq!(result.processed_tags, 5);
        assert_eq!(indices(&result), vec![100, 150, 150, 150, 200]);
    }

    #[test]
    fn identical_timestamps_no_hw() {
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2A", acq as u64 + 150_000, 0.0, false, acq as u64 + 150_000),
            tag("EVT_CMD2B", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD2C", acq as u64 + 150_000, 0.0, false, acq as u64 + 150_000),
            tag("EVT_CMD3", acq as u64 + 200_000, 0.0, true, acq as u64 + 200_000),
        ];
        let edges = vec![100usize, 150, 200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 250, acq);

        assert_eq!(result.processed_tags, 5);
        assert_eq!(indices(&result), vec![100, 150, 150, 150, 200]);
    }

    #[test]
    fn different_start_times_pulses_first() {
        let acq = 1_000_000i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 1_100_000, 0.0, true, acq as u64 + 1_100_000),
            tag("EVT_CMD2", acq as u64 + 1_150_000, 0.0, true, acq as u64 + 1_150_000),
            tag("EVT_CMD3", acq as u64 + 1_200_000, 0.0, true, acq as u64 + 1_200_000),
        ];
        let edges = vec![100usize, 150, 200, 1100, 1150, 1200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 1250, acq);

        assert_eq!(indices(&result), vec![100, 150, 200, 1100, 1150, 1200]);
        assert_eq!(names(&result)[..3], ["UNKNOWN_EVENT", "UNKNOWN_EVENT", "UNKNOWN_EVENT"]);
        assert_eq!(result.processed_tags, 3);
    }

    #[test]
    fn different_start_times_timing_first() {
        let acq = 1_000_000i64;
        let tags = vec![
            tag("EVT_CMD_A", (acq - 10_200_000) as u64, 0.0, true, (acq - 10_200_000) as u64),
            tag("EVT_CMD_B", (acq - 5_000_000) as u64, 0.0, true, (acq - 5_000_000) as u64),
            tag("EVT_CMD1", acq as u64 + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD3", acq as u64 + 200_000, 0.0, true, acq as u64 + 200_000),
        ];
        let edges = vec![100usize, 150, 200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 250, acq);

        assert_eq!(result.processed_tags, 5);
        assert_eq!(result.processed_samples, 240);
        assert_eq!(indices(&result), vec![100, 150, 200]);
    }

    #[test]
    fn overlapping_events() {
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD2B", acq as u64 + 151_000, 0.0, true, acq as u64 + 151_000),
            tag("EVT_CMD3", acq as u64 + 200_000, 0.0, true, acq as u64 + 200_000),
        ];
        let edges = vec![100usize, 150, 200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 250, acq);

        assert_eq!(indices(&result), vec![100, 150, 151, 200]);
        let residual = result.tags[2].1.get(keys::TRIGGER_OFFSET).and_then(PropertyValue::as_f32).unwrap();
        assert!((residual - 0.0).abs() < 1e-6);
    }

    #[test]
    fn multi_events() {
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD2B", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD3", acq as u64 + 200_000, 0.0, true, acq as u64 + 200_000),
        ];
        let edges = vec![100usize, 150, 200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 250, acq);

        assert_eq!(indices(&result), vec![100, 150, 150, 200]);
    }

    #[test]
    fn tag_without_trigger() {
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMDA", acq as u64 + 180_000, 0.0, false, acq as u64 + 180_000),
            tag("EVT_CMD3", acq as u64 + 200_000, 0.0, true, acq as u64 + 200_000),
        ];
        let edges = vec![100usize, 150, 200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 250, acq);

        assert_eq!(indices(&result), vec![100, 150, 180, 200]);
        assert_eq!(result.processed_tags, 4);
    }

    #[test]
    fn tag_with_missing_trigger() {
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMDA", acq as u64 + 180_000, 0.0, true, acq as u64 + 180_000),
            tag("EVT_CMD3", acq as u64 + 200_000, 0.0, true, acq as u64 + 200_000),
        ];
        let edges = vec![100usize, 150, 200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 250, acq);

        assert_eq!(indices(&result), vec![100, 150, 180, 200]);
        assert_eq!(result.processed_tags, 4);
        assert_eq!(result.messages.len(), 1);
    }

    #[test]
    fn future_pulses() {
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD3", acq as u64 + 200_000, 0.0, true, acq as u64 + 200_000),
        ];
        let edges = vec![100usize, 150, 200, 300, 2000];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 2001, acq);

        assert_eq!(result.processed_tags, 3);
        assert_eq!(indices(&result), vec![100, 150, 200, 300]);
        assert_eq!(names(&result).last().unwrap(), "UNKNOWN_EVENT");
    }

    #[test]
    fn different_clocks() {
        let acq = 123_456_789i64;
        let wr_base = 23_456_789u64;
        let tags = vec![
            tag("EVT_CMD1", wr_base + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2", wr_base + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD3", wr_base + 200_000, 0.0, true, acq as u64 + 200_000),
        ];
        let edges = vec![100usize, 150, 200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 250, acq);

        assert_eq!(indices(&result), vec![100, 150, 200]);
        // trigger_time itself is left untouched (still on the foreign clock).
        assert_eq!(
            result.tags[0].1.get(keys::TRIGGER_TIME).and_then(PropertyValue::as_u64),
            Some(wr_base + 100_000)
        );
    }

    #[test]
    fn compensate_offset() {
        // The edge, not the offset-corrected expectation, is ground truth:
        // every tag here must attach at its matched edge, with the
        // trigger_offset_ns folded into a signed residual instead.
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 100_000, -1e3, true, acq as u64 + 101_000),
            tag("EVT_CMD2", acq as u64 + 150_000, -2e4, true, acq as u64 + 170_000),
            tag("EVT_CMD3", acq as u64 + 200_000, -3e2, true, acq as u64 + 200_000),
        ];
        let edges = vec![101usize, 170, 200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 250, acq);

        assert_eq!(indices(&result), vec![101, 170, 200]);
        let expected_residuals = [-1e-6, -2e-5, -3e-7];
        for (tag, expected) in result.tags.iter().zip(expected_residuals) {
            let residual = tag.1.get(keys::TRIGGER_OFFSET).and_then(PropertyValue::as_f32).unwrap();
            assert!((residual as f64 - expected).abs() < 1e-9, "residual {residual} != {expected}");
        }
    }

    #[test]
    fn hw_trigger_offset_attaches_at_matched_edge() {
        // Pulse fires at the uncorrected search position (100); the tag's
        // trigger_offset_ns pulls its computed expectation to 95. Rule 2:
        // attach at the matched edge (100), not the expectation (95).
        let acq = 123_456_789i64;
        let tags = vec![tag("EVT_CMD1", acq as u64 + 100_000, -5e3, true, acq as u64 + 100_000)];
        let edges = vec![100usize];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 200, acq);

        assert_eq!(indices(&result), vec![100]);
        let residual = result.tags[0].1.get(keys::TRIGGER_OFFSET).and_then(PropertyValue::as_f32).unwrap();
        assert!((residual as f64 - (-5e-6)).abs() < 1e-9);
    }

    #[test]
    fn settle_margin_preserves_withheld_tags_edge() {
        // Tag expects index 95, which is past this chunk's settle_threshold
        // (90) and so is withheld for next call. An edge at 88 is within
        // tolerance of that withheld expectation and must not be settled as
        // UNKNOWN_EVENT now; an edge at 50 is unrelated and settles normally.
        let acq = 123_456_789i64;
        let tags = vec![tag("EVT_CMD1", acq as u64 + 95_000, 0.0, true, acq as u64 + 95_000)];
        let edges = vec![50usize, 88];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 100, acq);

        assert_eq!(result.processed_tags, 0);
        assert_eq!(indices(&result), vec![50]);
        assert_eq!(names(&result), vec!["UNKNOWN_EVENT"]);
    }

    #[test]
    fn empty_inputs_no_edges() {
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2", acq as u64 + 150_000, 0.0, true, acq as u64 + 150_000),
            tag("EVT_CMD3", acq as u64 + 200_000, 0.0, true, acq as u64 + 200_000),
        ];
        let edges: Vec<usize> = vec![];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 250, acq);

        assert_eq!(result.processed_tags, 3);
        assert_eq!(result.processed_samples, 240);
        assert!(result.tags.is_empty());
    }

    #[test]
    fn empty_inputs_no_tags() {
        let acq = 123_456_789i64;
        let edges = vec![100usize, 150, 200];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&[], &edges, 250, acq);

        assert_eq!(result.processed_samples, 240);
        assert_eq!(result.processed_tags, 0);
        assert_eq!(indices(&result), vec![100, 150, 200]);
        assert!(names(&result).iter().all(|n| n == "UNKNOWN_EVENT"));
    }

    #[test]
    fn empty_inputs_both() {
        let acq = 123_456_789i64;
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&[], &[], 250, acq);

        assert_eq!(result.processed_samples, 240);
        assert_eq!(result.processed_tags, 0);
        assert!(result.tags.is_empty());
    }

    #[test]
    fn max_delay_greater_than_chunk_length() {
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 1_000, 0.0, true, acq as u64 + 1_000),
            tag("EVT_CMD3", acq as u64 + 4_000, 0.0, true, acq as u64 + 4_000),
        ];
        let edges = vec![1usize, 4];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 8, acq);

        assert_eq!(result.processed_samples, 4);

        let mut matcher2 = TimingMatcher::new(1e6, 10_000);
        let result2 = matcher2.match_chunk(&[], &[], 8, acq);
        assert_eq!(result2.processed_samples, 0);
        assert_eq!(result2.processed_tags, 0);
    }

    #[test]
    fn neighbour_tags() {
        let acq = 123_456_789i64;
        let tags = vec![
            tag("EVT_CMD1", acq as u64 + 100_000, 0.0, true, acq as u64 + 100_000),
            tag("EVT_CMD2", acq as u64 + 101_000, 0.0, true, acq as u64 + 101_000),
            tag("EVT_CMD3", acq as u64 + 102_000, 0.0, true, acq as u64 + 102_000),
        ];
        let edges = vec![100usize, 101, 102];
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let result = matcher.match_chunk(&tags, &edges, 150, acq);

        assert_eq!(result.processed_samples, 140);
        assert_eq!(indices(&result), vec![100, 101, 102]);
    }

    #[test]
    fn state_propagation_across_calls() {
        let acq_start = 123_456_789i64;
        let mut matcher = TimingMatcher::new(1e6, 10_000);

        let tags1 = vec![
            tag("EVT_CMD1", acq_start as u64 + 100_000, 0.0, true, acq_start as u64 + 100_000),
            tag("EVT_CMD2", acq_start as u64 + 150_000, 0.0, true, acq_start as u64 + 150_000),
        ];
        let edges1 = vec![100usize, 150, 200];
        let result1 = matcher.match_chunk(&tags1, &edges1, 201, acq_start);
        assert_eq!(result1.processed_samples, 191);
        assert_eq!(indices(&result1), vec![100, 150]);

        let acq_start2 = acq_start + (result1.processed_samples as f64 / matcher.sample_rate_hz() * 1e9) as i64;
        let tags2 = vec![tag(
            "EVT_CMD3",
            acq_start2 as u64 + 9_000,
            0.0,
            true,
            acq_start2 as u64 + 9_000,
        )];
        let edges2 = vec![200usize - 191, 250 - 191];
        let result2 = matcher.match_chunk(&tags2, &edges2, 115, acq_start2);
        assert_eq!(result2.processed_samples, 105);
        assert_eq!(indices(&result2), vec![9]);

        matcher.reset();
        let acq_start3 = acq_start2 + (result2.processed_samples as f64 / matcher.sample_rate_hz() * 1e9) as i64;
        let result3 = matcher.match_chunk(&[], &[], 104, acq_start3);
        assert_eq!(result3.processed_samples, 94);
    }

    #[test]
    fn reset_law_holds_on_empty_input() {
        let acq = 123_456_789i64;
        let mut matcher = TimingMatcher::new(1e6, 10_000);
        let first = matcher.match_chunk(&[], &[], 250, acq);
        matcher.reset();
        let second = matcher.match_chunk(&[], &[], 250, acq);
        assert_eq!(first, second);
    }
}
