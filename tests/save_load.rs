//! Whole-document save/load: round-trips, mid-stream handoff, GC.

mod fixtures;

use fixtures::{capture, doc, sends};
use weft::{CallerTag, Counter, DocEvent, LwwRegister, UpdateKind};

#[test]
fn fresh_replica_load_equals_source() {
    let mut a = doc("aaa");
    let a_counter = Counter::register(&mut a, "total").unwrap();
    let a_reg = LwwRegister::<String>::register(&mut a, "title").unwrap();
    a.transact(|tx| {
        a_counter.add(tx, 7)?;
        a_reg.set(tx, "draft".into())
    })
    .unwrap();

    let saved = a.save().unwrap();

    let mut fresh = doc("ddd");
    let f_counter = Counter::register(&mut fresh, "total").unwrap();
    let f_reg = LwwRegister::<String>::register(&mut fresh, "title").unwrap();
    fresh.load(&saved, None).unwrap();

    assert_eq!(fresh.vector_clock(), a.vector_clock());
    assert_eq!(f_counter.value(&fresh).unwrap(), 7);
    assert_eq!(f_reg.get(&fresh).unwrap(), Some("draft".into()));
    assert_eq!(fresh.save().unwrap(), a.save().unwrap());
}

#[test]
fn load_is_idempotent() {
    let mut a = doc("aaa");
    let a_counter = Counter::register(&mut a, "total").unwrap();
    a.transact(|tx| a_counter.add(tx, 3)).unwrap();
    let saved = a.save().unwrap();

    let mut b = doc("bbb");
    let b_counter = Counter::register(&mut b, "total").unwrap();
    b.load(&saved, None).unwrap();
    let once = b.save().unwrap();

    let outcome = b.load(&saved, None).unwrap();
    assert_eq!(outcome.applied, 0);
    assert_eq!(b_counter.value(&b).unwrap(), 3);
    assert_eq!(b.save().unwrap(), once);
}

#[test]
fn save_load_mid_stream_then_catch_up() {
    let mut a = doc("aaa");
    let a_counter = Counter::register(&mut a, "total").unwrap();
    let a_log = capture(&mut a);
    for delta in [1, 2, 3, 4, 5] {
        a.transact(|tx| a_counter.add(tx, delta)).unwrap();
    }

    // c bootstraps from a's save instead of replaying five messages.
    let mut c = doc("ccc");
    let c_counter = Counter::register(&mut c, "total").unwrap();
    c.load(&a.save().unwrap(), None).unwrap();
    assert_eq!(c.vector_clock(), a.vector_clock());
    assert_eq!(c_counter.value(&c).unwrap(), 15);

    // Op #6 flows as a normal message.
    a.transact(|tx| a_counter.add(tx, 6)).unwrap();
    let messages = sends(&a_log);
    c.receive(&messages[5], None).unwrap();

    assert_eq!(c_counter.value(&c).unwrap(), 21);
    assert_eq!(c.save().unwrap(), a.save().unwrap());
}

#[test]
fn loading_merges_divergent_histories() {
    let mut a = doc("aaa");
    let a_counter = Counter::register(&mut a, "total").unwrap();
    a.transact(|tx| a_counter.add(tx, 10)).unwrap();

    let mut b = doc("bbb");
    let b_counter = Counter::register(&mut b, "total").unwrap();
    b.transact(|tx| b_counter.add(tx, 5)).unwrap();

    // Each side loads the other's save; both end with both histories.
    let a_saved = a.save().unwrap();
    let b_saved = b.save().unwrap();
    a.load(&b_saved, None).unwrap();
    b.load(&a_saved, None).unwrap();

    assert_eq!(a_counter.value(&a).unwrap(), 15);
    assert_eq!(b_counter.value(&b).unwrap(), 15);
    assert_eq!(a.vector_clock(), b.vector_clock());
    assert_eq!(a.save().unwrap(), b.save().unwrap());
}

#[test]
fn pending_buffer_survives_the_round_trip() {
    let mut a = doc("aaa");
    let a_counter = Counter::register(&mut a, "total").unwrap();
    let a_log = capture(&mut a);
    a.transact(|tx| a_counter.add(tx, 1)).unwrap();
    a.transact(|tx| a_counter.add(tx, 10)).unwrap();
    let messages = sends(&a_log);

    // b holds #2, blocked on #1.
    let mut b = doc("bbb");
    Counter::register(&mut b, "total").unwrap();
    b.receive(&messages[1], None).unwrap();
    assert_eq!(b.pending_len(), 1);

    // The blocked transaction rides along in the save.
    let saved = b.save().unwrap();
    let mut b2 = doc("eee");
    let b2_counter = Counter::register(&mut b2, "total").unwrap();
    b2.load(&saved, None).unwrap();
    assert_eq!(b2.pending_len(), 1);
    assert_eq!(b2_counter.value(&b2).unwrap(), 0);

    // Once #1 arrives, the rehydrated buffer drains.
    b2.receive(&messages[0], None).unwrap();
    assert_eq!(b2.pending_len(), 0);
    assert_eq!(b2_counter.value(&b2).unwrap(), 11);
}

#[test]
fn untouched_collabs_are_omitted_and_rehydrate_fresh() {
    let mut a = doc("aaa");
    let touched = Counter::register(&mut a, "touched").unwrap();
    Counter::register(&mut a, "untouched").unwrap();
    a.transact(|tx| touched.add(tx, 1)).unwrap();

    let saved = a.save().unwrap();

    let mut b = doc("bbb");
    let b_touched = Counter::register(&mut b, "touched").unwrap();
    let b_untouched = Counter::register(&mut b, "untouched").unwrap();
    b.load(&saved, None).unwrap();

    assert_eq!(b_touched.value(&b).unwrap(), 1);
    // GC-omitted collab is simply its initial state.
    assert_eq!(b_untouched.value(&b).unwrap(), 0);
}

#[test]
fn load_emits_saved_state_update_with_caller_tag() {
    let mut a = doc("aaa");
    let a_counter = Counter::register(&mut a, "total").unwrap();
    a.transact(|tx| a_counter.add(tx, 1)).unwrap();
    let saved = a.save().unwrap();

    let mut b = doc("bbb");
    Counter::register(&mut b, "total").unwrap();
    let b_log = capture(&mut b);
    let tag = CallerTag::new("indexeddb").unwrap();
    b.load(&saved, Some(&tag)).unwrap();

    let events = b_log.borrow();
    assert!(events.iter().any(|event| matches!(
        event,
        DocEvent::Update {
            kind: UpdateKind::SavedState,
            caller: Some(c),
        } if c == &tag
    )));
    assert!(events.iter().any(|event| matches!(event, DocEvent::Change)));
}

#[test]
fn save_is_deterministic() {
    let mut a = doc("aaa");
    let a_counter = Counter::register(&mut a, "total").unwrap();
    a.transact(|tx| a_counter.add(tx, 2)).unwrap();
    assert_eq!(a.save().unwrap(), a.save().unwrap());
}
