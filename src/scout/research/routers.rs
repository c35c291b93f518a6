// SPDX-License-Identifier: MIT

//! Conditional edges of the research workflow

use serde_json::json;

use super::channels::*;
use super::collaborators::IntentType;
use super::{ResearchServices, FINALIZE_ANSWER, GENERATE_QUERY, VIDEO_ACTION, WEB_RESEARCH};
use crate::scout::workflow::graph::{LoopGuard, RouteDecision, RunContext};
use crate::scout::workflow::state::Snapshot;

/// Pure video requests bypass research; mixed requests research
pub fn route_after_intent(snapshot: &Snapshot, _ctx: &RunContext<ResearchServices>) -> RouteDecision {
    let intent = snapshot
        .get_str(INTENT_TYPE)
        .map(IntentType::parse)
        .unwrap_or_default();

    match intent {
        IntentType::Video => RouteDecision::to(VIDEO_ACTION),
        IntentType::Research | IntentType::Mixed => RouteDecision::to(GENERATE_QUERY),
    }
}

fn search_fan_out(queries: Vec<String>, first_id: usize) -> RouteDecision {
    RouteDecision::fan_out(
        WEB_RESEARCH,
        queries
            .into_iter()
            .enumerate()
            .map(|(i, query)| json!({ "search_query": query, "id": first_id + i })),
    )
}

/// One web research instance per generated query
pub fn continue_to_web_research(
    snapshot: &Snapshot,
    _ctx: &RunContext<ResearchServices>,
) -> RouteDecision {
    let queries = snapshot.strings(QUERY_LIST);
    if queries.is_empty() {
        log::warn!("No search queries to run, going straight to the answer");
        return RouteDecision::to(FINALIZE_ANSWER);
    }
    search_fan_out(queries, 0)
}

/// Finalize when the results are sufficient or the loop budget is spent,
/// otherwise search the follow-up queries
pub fn evaluate_research(snapshot: &Snapshot, ctx: &RunContext<ResearchServices>) -> RouteDecision {
    let guard = LoopGuard::for_run(RESEARCH_LOOP_COUNT, ctx);
    let sufficient = snapshot.get_bool(IS_SUFFICIENT).unwrap_or(false);

    guard.route(snapshot, sufficient, FINALIZE_ANSWER, || {
        let follow_ups = snapshot.strings(FOLLOW_UP_QUERIES);
        if follow_ups.is_empty() {
            log::info!("Results insufficient but no follow-up queries, finalizing");
            return RouteDecision::to(FINALIZE_ANSWER);
        }
        let ran = snapshot.get_u64(NUMBER_OF_RAN_QUERIES).unwrap_or(0) as usize;
        search_fan_out(follow_ups, ran)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scout::research::testing::{context, snapshot, MockBackend};
    use crate::scout::workflow::graph::FanOut;
    use std::sync::Arc;

    fn ctx(max_loops: u32) -> RunContext<ResearchServices> {
        context(Arc::new(MockBackend::default())).with_max_loops(max_loops)
    }

    #[test]
    fn test_intent_routing() {
        let c = ctx(2);
        assert_eq!(
            route_after_intent(&snapshot(json!({"intent_type": "video"})), &c),
            RouteDecision::to(VIDEO_ACTION)
        );
        assert_eq!(
            route_after_intent(&snapshot(json!({"intent_type": "mixed"})), &c),
            RouteDecision::to(GENERATE_QUERY)
        );
        assert_eq!(
            route_after_intent(&snapshot(json!({})), &c),
            RouteDecision::to(GENERATE_QUERY)
        );
    }

    #[test]
    fn test_initial_fan_out_numbers_from_zero() {
        let decision = continue_to_web_research(&snapshot(json!({"query_list": ["a", "b", "c"]})), &ctx(2));

        assert_eq!(
            decision,
            RouteDecision::FanOut(FanOut::new(
                WEB_RESEARCH,
                vec![
                    json!({"search_query": "a", "id": 0}),
                    json!({"search_query": "b", "id": 1}),
                    json!({"search_query": "c", "id": 2}),
                ]
            ))
        );
    }

    #[test]
    fn test_no_queries_goes_to_answer() {
        let decision = continue_to_web_research(&snapshot(json!({"query_list": []})), &ctx(2));
        assert_eq!(decision, RouteDecision::to(FINALIZE_ANSWER));
    }

    #[test]
    fn test_follow_ups_continue_numbering() {
        let snap = snapshot(json!({
            "is_sufficient": false,
            "follow_up_queries": ["x", "y"],
            "research_loop_count": 1,
            "number_of_ran_queries": 3
        }));

        match evaluate_research(&snap, &ctx(2)) {
            RouteDecision::FanOut(fan_out) => {
                let ids: Vec<_> = fan_out.instances().iter().map(|i| i.payload["id"].clone()).collect();
                assert_eq!(ids, vec![json!(3), json!(4)]);
                assert_eq!(fan_out.instances()[1].index, 1);
            }
            other => panic!("expected fan-out, got {:?}", other),
        }
    }

    #[test]
    fn test_sufficient_finalizes() {
        let snap = snapshot(json!({
            "is_sufficient": true,
            "follow_up_queries": ["x"],
            "research_loop_count": 1
        }));
        assert_eq!(evaluate_research(&snap, &ctx(5)), RouteDecision::to(FINALIZE_ANSWER));
    }

    #[test]
    fn test_loop_limit_forces_finalize() {
        let snap = snapshot(json!({
            "is_sufficient": false,
            "follow_up_queries": ["x"],
            "research_loop_count": 2
        }));
        assert_eq!(evaluate_research(&snap, &ctx(2)), RouteDecision::to(FINALIZE_ANSWER));
    }
}
