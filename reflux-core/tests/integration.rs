//! Integration Tests for Reactive System
//!
//! These tests verify that signals, memos, and effects work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use reflux_core::reactive::{Effect, Memo, Runtime, Signal};
use reflux_core::{ReactiveError, RuntimeConfig};

/// Shared counter bumped from inside computations.
fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

fn counted_memo<T, F>(rt: &Runtime, count: &Rc<Cell<usize>>, compute: F) -> Memo<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> reflux_core::Result<T> + 'static,
{
    let count = count.clone();
    Memo::new(rt, move || {
        count.set(count.get() + 1);
        compute()
    })
}

/// x = 1, double = x * 2: equal sets leave the cache alone.
#[test]
fn doubling_scenario() {
    let rt = Runtime::new();
    let x = Signal::new(&rt, 1);
    let computes = counter();

    let double = {
        let x = x.clone();
        counted_memo(&rt, &computes, move || Ok(x.get()? * 2))
    };

    assert_eq!(double.get(), Ok(2));
    assert_eq!(computes.get(), 1);

    x.set(1).unwrap();
    assert_eq!(double.get(), Ok(2));
    assert_eq!(computes.get(), 1);

    x.set(5).unwrap();
    assert_eq!(double.get(), Ok(10));
    assert_eq!(computes.get(), 2);
}

/// A -> B -> C: one change recomputes C once.
#[test]
fn chain_recomputes_tail_once() {
    let rt = Runtime::new();
    let a = rt.signal(1);
    let (b_count, c_count) = (counter(), counter());

    let b = {
        let a = a.clone();
        counted_memo(&rt, &b_count, move || Ok(a.get()? + 1))
    };
    let c = {
        let b = b.clone();
        counted_memo(&rt, &c_count, move || Ok(b.get()? * 10))
    };

    assert_eq!(c.get(), Ok(20));

    a.set(4).unwrap();
    assert_eq!(c.get(), Ok(50));
    assert_eq!(b_count.get(), 2);
    assert_eq!(c_count.get(), 2);
}

/// A -> B, A -> D, B -> C, D -> C: C recomputes once despite two paths.
#[test]
fn diamond_recomputes_join_once() {
    let rt = Runtime::new();
    let a = rt.signal(1);
    let (b_count, d_count, c_count) = (counter(), counter(), counter());

    let b = {
        let a = a.clone();
        counted_memo(&rt, &b_count, move || Ok(a.get()? + 1))
    };
    let d = {
        let a = a.clone();
        counted_memo(&rt, &d_count, move || Ok(a.get()? * 2))
    };
    let c = {
        let (b, d) = (b.clone(), d.clone());
        counted_memo(&rt, &c_count, move || Ok(b.get()? + d.get()?))
    };

    assert_eq!(c.get(), Ok(4));
    assert_eq!(c_count.get(), 1);

    a.set(10).unwrap();
    assert_eq!(c.get(), Ok(31));
    assert_eq!(b_count.get(), 2);
    assert_eq!(d_count.get(), 2);
    assert_eq!(c_count.get(), 2);
}

/// An effect over a diamond runs once per cycle.
#[test]
fn diamond_effect_runs_once_per_change() {
    let rt = Runtime::new();
    let a = rt.signal(1);
    let b = {
        let a = a.clone();
        rt.memo(move || Ok(a.get()? + 1))
    };
    let d = {
        let a = a.clone();
        rt.memo(move || Ok(a.get()? * 2))
    };
    let seen = Rc::new(RefCell::new(Vec::new()));
    let effect = {
        let (b, d, seen) = (b.clone(), d.clone(), seen.clone());
        rt.effect(move || {
            seen.borrow_mut().push(b.get()? + d.get()?);
            Ok(())
        })
    };

    a.set(2).unwrap();
    a.set(3).unwrap();

    assert_eq!(*seen.borrow(), vec![4, 7, 10]);
    assert_eq!(effect.run_count(), 3);
}

#[test]
fn memo_caches_expensive_computation() {
    let rt = Runtime::new();
    let computes = counter();
    let memo = counted_memo(&rt, &computes, || Ok(42));

    assert_eq!(memo.get(), Ok(42));
    assert_eq!(memo.get(), Ok(42));
    assert_eq!(memo.get(), Ok(42));
    assert_eq!(computes.get(), 1);
}

/// Effects run at registration, then only when their own inputs change.
#[test]
fn effect_ignores_unrelated_producers() {
    let rt = Runtime::new();
    let watched = rt.signal(0);
    let unrelated = rt.signal(0);
    let runs = counter();

    let _effect = {
        let (watched, runs) = (watched.clone(), runs.clone());
        Effect::new(&rt, move || {
            watched.get()?;
            runs.set(runs.get() + 1);
            Ok(())
        })
    };
    assert_eq!(runs.get(), 1);

    unrelated.set(1).unwrap();
    assert_eq!(runs.get(), 1);

    watched.set(1).unwrap();
    assert_eq!(runs.get(), 2);

    watched.set(1).unwrap();
    assert_eq!(runs.get(), 2);
}

/// A memo whose value did not change shields downstream effects.
#[test]
fn equality_cut_off_through_memo() {
    let rt = Runtime::new();
    let n = rt.signal(2);
    let is_even = {
        let n = n.clone();
        rt.memo(move || Ok(n.get()? % 2 == 0))
    };
    let runs = counter();
    let _effect = {
        let (is_even, runs) = (is_even.clone(), runs.clone());
        rt.effect(move || {
            is_even.get()?;
            runs.set(runs.get() + 1);
            Ok(())
        })
    };

    n.set(4).unwrap();
    n.set(8).unwrap();
    assert_eq!(runs.get(), 1);
    assert_eq!(is_even.compute_count(), 3);

    n.set(3).unwrap();
    assert_eq!(runs.get(), 2);
}

#[test]
fn batch_runs_effect_once_for_many_sets() {
    let rt = Runtime::new();
    let first = rt.signal("Ada".to_string());
    let last = rt.signal("Lovelace".to_string());
    let rendered = Rc::new(RefCell::new(Vec::new()));

    let _effect = {
        let (first, last, rendered) = (first.clone(), last.clone(), rendered.clone());
        rt.effect(move || {
            rendered
                .borrow_mut()
                .push(format!("{} {}", first.get()?, last.get()?));
            Ok(())
        })
    };

    rt.batch(|| -> reflux_core::Result<()> {
        first.set("Grace".to_string())?;
        last.set("Hopper".to_string())?;
        Ok(())
    })
    .unwrap()
    .unwrap();

    assert_eq!(*rendered.borrow(), ["Ada Lovelace", "Grace Hopper"]);
}

/// Dependencies are rebuilt every run, so a branch not taken stops
/// triggering updates.
#[test]
fn conditional_reads_drop_stale_edges() {
    let rt = Runtime::new();
    let use_metric = rt.signal(true);
    let celsius = rt.signal(20.0_f64);
    let fahrenheit = rt.signal(68.0_f64);
    let computes = counter();

    let display = {
        let (use_metric, celsius, fahrenheit) =
            (use_metric.clone(), celsius.clone(), fahrenheit.clone());
        counted_memo(&rt, &computes, move || {
            if use_metric.get()? {
                Ok(format!("{}C", celsius.get()?))
            } else {
                Ok(format!("{}F", fahrenheit.get()?))
            }
        })
    };

    assert_eq!(display.get(), Ok("20C".to_string()));
    assert_eq!(fahrenheit.dependent_count(), 0);

    use_metric.set(false).unwrap();
    assert_eq!(display.get(), Ok("68F".to_string()));
    assert_eq!(celsius.dependent_count(), 0);
    assert_eq!(computes.get(), 2);

    // Celsius is no longer read, so changing it does nothing.
    celsius.set(25.0).unwrap();
    assert_eq!(display.get(), Ok("68F".to_string()));
    assert_eq!(computes.get(), 2);
}

#[test]
fn cached_failure_is_not_recomputed() {
    let rt = Runtime::new();
    let raw = rt.signal("12a".to_string());
    let computes = counter();

    let parsed = {
        let raw = raw.clone();
        counted_memo(&rt, &computes, move || {
            raw.get()?
                .parse::<i64>()
                .map_err(ReactiveError::compute)
        })
    };

    let first = parsed.get();
    assert!(matches!(first, Err(ReactiveError::Compute(_))));
    assert_eq!(parsed.get(), first);
    assert_eq!(computes.get(), 1);

    raw.set("12".to_string()).unwrap();
    assert_eq!(parsed.get(), Ok(12));
    assert_eq!(computes.get(), 2);
}

/// Errors flow to dependents like values do.
#[test]
fn failures_propagate_to_dependents() {
    let rt = Runtime::new();
    let input: Signal<u32> = Signal::new_unset(&rt).with_label("file");
    let size = {
        let input = input.clone();
        rt.memo(move || Ok(input.get()? * 1024))
    };
    let label = {
        let size = size.clone();
        rt.memo(move || Ok(format!("{} bytes", size.get()?)))
    };

    assert_eq!(label.get(), Err(ReactiveError::Unset("file".to_string())));

    input.set(2).unwrap();
    assert_eq!(label.get(), Ok("2048 bytes".to_string()));
}

#[test]
fn self_referential_memo_reports_cycle() {
    let rt = Runtime::new();
    let slot: Rc<RefCell<Option<Memo<i32>>>> = Rc::new(RefCell::new(None));

    let looped = {
        let slot = slot.clone();
        Memo::new(&rt, move || {
            let me = slot.borrow().clone();
            match me {
                Some(me) => Ok(me.get()? + 1),
                None => Ok(0),
            }
        })
        .with_label("looped")
    };
    *slot.borrow_mut() = Some(looped.clone());

    let err = looped.get().unwrap_err();
    assert_eq!(
        err,
        ReactiveError::Cycle {
            path: vec!["looped".to_string(), "looped".to_string()]
        }
    );
}

#[test]
fn mutual_recursion_reports_full_path() {
    let rt = Runtime::new();
    let slot: Rc<RefCell<Option<Memo<i32>>>> = Rc::new(RefCell::new(None));

    let first = {
        let slot = slot.clone();
        Memo::new(&rt, move || {
            let second = slot.borrow().clone();
            match second {
                Some(second) => second.get(),
                None => Ok(0),
            }
        })
        .with_label("first")
    };
    let second = {
        let first = first.clone();
        Memo::new(&rt, move || first.get()).with_label("second")
    };
    *slot.borrow_mut() = Some(second.clone());

    let expected = ReactiveError::Cycle {
        path: vec!["first".into(), "second".into(), "first".into()],
    };
    assert_eq!(first.get(), Err(expected));
}

#[test]
fn failing_effect_does_not_stop_others() {
    let rt = Runtime::new();
    let trigger = rt.signal(0);
    let healthy_runs = counter();

    let broken = {
        let trigger = trigger.clone();
        rt.effect(move || {
            if trigger.get()? > 0 {
                return Err(ReactiveError::compute("upload rejected"));
            }
            Ok(())
        })
        .with_label("broken")
    };
    let _healthy = {
        let (trigger, healthy_runs) = (trigger.clone(), healthy_runs.clone());
        rt.effect(move || {
            trigger.get()?;
            healthy_runs.set(healthy_runs.get() + 1);
            Ok(())
        })
    };

    trigger.set(1).unwrap();

    assert_eq!(healthy_runs.get(), 2);
    assert_eq!(broken.last_error(), Some(ReactiveError::compute("upload rejected")));
    assert_eq!(rt.stats().effect_failures, 1);
}

#[test]
fn writes_inside_memos_are_rejected() {
    let rt = Runtime::new();
    let target = rt.signal(0).with_label("target");
    let sneaky = {
        let target = target.clone();
        rt.memo(move || target.set(1))
    };

    assert_eq!(
        sneaky.get(),
        Err(ReactiveError::WriteDuringDerivation("target".to_string()))
    );
    assert_eq!(target.get(), Ok(0));
}

/// An effect writing a signal starts a follow-up cycle inside the same flush.
#[test]
fn effect_writes_run_in_follow_up_cycle() {
    let rt = Runtime::new();
    let celsius = rt.signal(0.0_f64);
    let fahrenheit = rt.signal(32.0_f64);
    let shown = Rc::new(RefCell::new(Vec::new()));

    let _convert = {
        let (celsius, fahrenheit) = (celsius.clone(), fahrenheit.clone());
        rt.effect(move || {
            fahrenheit.set(celsius.get()? * 9.0 / 5.0 + 32.0)?;
            Ok(())
        })
    };
    let _show = {
        let (fahrenheit, shown) = (fahrenheit.clone(), shown.clone());
        rt.effect(move || {
            shown.borrow_mut().push(fahrenheit.get()?);
            Ok(())
        })
    };

    let cycles_before = rt.cycle();
    celsius.set(100.0).unwrap();

    assert_eq!(*shown.borrow(), vec![32.0, 212.0]);
    assert_eq!(rt.cycle(), cycles_before + 2);
}

#[test]
fn runaway_effects_stop_at_pass_limit() {
    let rt = Runtime::with_config(RuntimeConfig::default().with_max_flush_passes(5));
    let ticks = rt.signal(0u32);

    let _runaway = {
        let ticks = ticks.clone();
        rt.effect(move || {
            let now = ticks.get()?;
            if now > 0 {
                ticks.set(now + 1)?;
            }
            Ok(())
        })
    };

    assert_eq!(ticks.set(1), Err(ReactiveError::Unsettled(5)));
    assert_eq!(rt.pending_effects(), 1);
}

#[test]
fn effects_run_shallowest_first() {
    let rt = Runtime::new();
    let source = rt.signal(0);
    let order = Rc::new(RefCell::new(Vec::new()));

    let deep_memo = {
        let source = source.clone();
        let inner = rt.memo(move || source.get());
        rt.memo(move || Ok(inner.get()? + 1))
    };

    let _deep = {
        let order = order.clone();
        rt.effect(move || {
            deep_memo.get()?;
            order.borrow_mut().push("deep");
            Ok(())
        })
    };
    let _shallow = {
        let (source, order) = (source.clone(), order.clone());
        rt.effect(move || {
            source.get()?;
            order.borrow_mut().push("shallow");
            Ok(())
        })
    };

    order.borrow_mut().clear();
    source.set(1).unwrap();
    assert_eq!(*order.borrow(), ["shallow", "deep"]);
}

#[test]
fn lazy_effect_waits_for_execute() {
    let rt = Runtime::new();
    let source = rt.signal(1);
    let runs = counter();

    let effect = {
        let (source, runs) = (source.clone(), runs.clone());
        Effect::new_lazy(&rt, move || {
            source.get()?;
            runs.set(runs.get() + 1);
            Ok(())
        })
    };

    source.set(2).unwrap();
    assert_eq!(runs.get(), 0);

    effect.execute().unwrap();
    source.set(3).unwrap();
    assert_eq!(runs.get(), 2);
}

#[test]
fn handles_outliving_runtime_fail_cleanly() {
    let rt = Runtime::new();
    let source = rt.signal(1);
    let memo = {
        let source = source.clone();
        rt.memo(move || source.get())
    };
    let effect = rt.effect(|| Ok(()));
    drop(rt);

    assert_eq!(memo.get(), Err(ReactiveError::RuntimeDropped));
    assert_eq!(source.set(2), Err(ReactiveError::RuntimeDropped));
    assert!(effect.is_disposed());
}

/// Builds `a = flag ? b : 1 + c` and `b = a + 1`, with `c = s / 10`.
///
/// While `flag` is set the two memos read each other.
fn guarded_loop(rt: &Runtime) -> (Signal<bool>, Signal<i32>, Memo<i32>, Memo<i32>, Memo<i32>) {
    let flag = rt.signal(true).with_label("flag");
    let s = rt.signal(1).with_label("s");
    let c = {
        let s = s.clone();
        rt.memo(move || Ok(s.get()? / 10)).with_label("c")
    };
    let slot: Rc<RefCell<Option<Memo<i32>>>> = Rc::new(RefCell::new(None));

    let a = {
        let (flag, c, slot) = (flag.clone(), c.clone(), slot.clone());
        rt.memo(move || {
            let offset = c.get()?;
            if flag.get()? {
                let b = slot.borrow().clone();
                match b {
                    Some(b) => b.get(),
                    None => Ok(0),
                }
            } else {
                Ok(1 + offset)
            }
        })
        .with_label("a")
    };
    let b = {
        let a = a.clone();
        rt.memo(move || Ok(a.get()? + 1)).with_label("b")
    };
    *slot.borrow_mut() = Some(b.clone());

    (flag, s, c, a, b)
}

/// A cycle failure is invalidated once the branch that closed the loop is
/// no longer taken.
#[test]
fn cycle_failure_recovers_when_loop_is_broken() {
    let rt = Runtime::new();
    let (flag, _s, _c, a, b) = guarded_loop(&rt);

    let cycle = ReactiveError::Cycle {
        path: vec!["a".into(), "b".into(), "a".into()],
    };
    assert_eq!(a.get(), Err(cycle.clone()));
    assert_eq!(b.get(), Err(cycle));
    assert_eq!(b.dependency_count(), 1);

    flag.set(false).unwrap();

    assert_eq!(b.get(), Ok(2));
    assert_eq!(a.get(), Ok(1));
    assert_eq!(b.compute_count(), 2);
    assert_eq!(a.dependent_count(), 1);
}

/// Verifying a stale node through a loop of edges terminates and keeps the
/// cached failure when nothing on the loop changed.
#[test]
fn verification_through_cycle_edges_terminates() {
    let rt = Runtime::new();
    let (_flag, s, c, a, b) = guarded_loop(&rt);

    assert!(matches!(b.get(), Err(ReactiveError::Cycle { .. })));
    let a_runs = a.compute_count();

    // c stays 0, so neither memo on the loop needs to recompute.
    s.set(2).unwrap();

    assert!(matches!(b.get(), Err(ReactiveError::Cycle { .. })));
    assert_eq!(a.compute_count(), a_runs);
    assert_eq!(c.compute_count(), 2);
}

#[test]
fn effect_disposing_itself_leaves_no_edges() {
    let rt = Runtime::new();
    let source = rt.signal(0);
    let slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

    let effect = {
        let (source, slot) = (source.clone(), slot.clone());
        rt.effect(move || {
            if source.get()? > 0 {
                if let Some(me) = slot.borrow().as_ref() {
                    me.dispose();
                }
            }
            Ok(())
        })
    };
    *slot.borrow_mut() = Some(effect.clone());

    source.set(1).unwrap();

    assert!(effect.is_disposed());
    assert_eq!(effect.run_count(), 2);
    assert_eq!(effect.dependency_count(), 0);
    assert_eq!(source.dependent_count(), 0);

    source.set(2).unwrap();
    assert_eq!(effect.run_count(), 2);
}

/// Teardown from inside a running effect detaches that effect too.
#[test]
fn teardown_inside_effect_detaches_it() {
    let rt = Runtime::new();
    let source = rt.signal(0);

    let effect = {
        let (source, weak) = (source.clone(), rt.downgrade());
        rt.effect(move || {
            if source.get()? > 0 {
                weak.upgrade()?.teardown();
            }
            Ok(())
        })
    };

    source.set(1).unwrap();

    assert!(effect.is_disposed());
    assert_eq!(source.dependent_count(), 0);
}

/// Sets that a custom equality treats as equal reach neither memos nor
/// effects.
#[test]
fn custom_equality_suppresses_recomputation() {
    let rt = Runtime::new();
    let query = Signal::with_equality(&rt, "Rust".to_string(), |a, b| {
        a.trim().eq_ignore_ascii_case(b.trim())
    });

    let normalized = {
        let query = query.clone();
        rt.memo(move || Ok(query.get()?.trim().to_lowercase()))
    };
    let searches = {
        let query = query.clone();
        rt.effect(move || query.get().map(drop))
    };

    assert_eq!(normalized.get(), Ok("rust".to_string()));

    assert_eq!(query.set("  RUST ".to_string()), Ok(false));
    assert_eq!(normalized.get(), Ok("rust".to_string()));
    assert_eq!(normalized.compute_count(), 1);
    assert_eq!(searches.run_count(), 1);
    assert_eq!(query.revision(), 0);

    assert_eq!(query.set("Go".to_string()), Ok(true));
    assert_eq!(normalized.get(), Ok("go".to_string()));
    assert_eq!(normalized.compute_count(), 2);
    assert_eq!(searches.run_count(), 2);
}
