use crate::{AbortReason, Effect, LoopState, Msg, Phase, RunOutcome};

/// Pure update function: applies a message to the loop state and returns the
/// effects the engine must execute next.
///
/// Messages that do not fit the current phase are ignored.
pub fn update(mut state: LoopState, msg: Msg) -> (LoopState, Vec<Effect>) {
    let effects = match (state.phase(), msg) {
        (Phase::Idle, Msg::Started) => enter_page(&mut state, 1),
        (Phase::ScanningPage, Msg::PageScanned { passed_target_date }) => {
            if passed_target_date {
                state.mark_passed_target_date();
            }
            state.set_phase(Phase::DecidingStop);
            decide_stop(&mut state)
        }
        (Phase::Navigating, Msg::NavigationSettled { advanced: true }) => {
            state.reset_nav_failures();
            let next = state.page_number() + 1;
            enter_page(&mut state, next)
        }
        (Phase::Navigating, Msg::NavigationSettled { advanced: false }) => {
            let failures = state.record_nav_failure();
            if failures > state.limits().nav_failure_threshold {
                abort(
                    &mut state,
                    AbortReason::NavigationFailures {
                        consecutive: failures,
                    },
                )
            } else {
                vec![Effect::RetryNavigation {
                    from_page: state.page_number(),
                    failures,
                }]
            }
        }
        _ => Vec::new(),
    };

    (state, effects)
}

fn enter_page(state: &mut LoopState, page_number: u32) -> Vec<Effect> {
    state.set_page_number(page_number);
    let max_pages = state.limits().max_pages;
    if page_number > max_pages {
        return abort(state, AbortReason::MaxPages { max_pages });
    }
    state.set_phase(Phase::ScanningPage);
    vec![Effect::ScanPage { page_number }]
}

fn decide_stop(state: &mut LoopState) -> Vec<Effect> {
    if state.passed_target_date() && state.page_number() >= state.limits().min_pages {
        state.set_phase(Phase::Done);
        return vec![Effect::Finish(RunOutcome::Done)];
    }
    state.set_phase(Phase::Navigating);
    vec![Effect::Navigate {
        from_page: state.page_number(),
    }]
}

fn abort(state: &mut LoopState, reason: AbortReason) -> Vec<Effect> {
    state.set_phase(Phase::Aborted(reason));
    vec![Effect::Finish(RunOutcome::Aborted(reason))]
}
