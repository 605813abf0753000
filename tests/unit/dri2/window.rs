use super::*;

#[test]
fn odd_requests_record_size_even_requests_compare() {
    let mut ws = WindowState::new(SurfaceId(7));
    assert!(!ws.record_request(100, 50));
    assert!(ws.is_odd_request());
    assert_eq!((ws.width, ws.height), (100, 50));

    assert!(!ws.record_request(100, 50));
    assert!(!ws.is_odd_request());

    assert!(!ws.record_request(120, 60));
    assert!(ws.record_request(100, 50));
    assert_eq!((ws.width, ws.height), (120, 60));
}

#[test]
fn swap_exchanges_slots_and_counts() {
    let mut ws = WindowState::new(SurfaceId(1));
    ws.front = Some(BoId(1));
    ws.back = Some(BoId(2));
    ws.swap();
    assert_eq!(ws.front, Some(BoId(2)));
    assert_eq!(ws.back, Some(BoId(1)));
    assert_eq!(ws.swap_count, 1);
}

#[test]
fn take_all_empties_slots_and_queue() {
    let mut ws = WindowState::new(SurfaceId(1));
    ws.mem = Some(BoId(1));
    ws.front = Some(BoId(2));
    ws.queue.enqueue(BoId(3)).unwrap();
    ws.queue.enqueue(BoId(4)).unwrap();

    let taken = ws.take_all();
    assert_eq!(taken, vec![BoId(1), BoId(2), BoId(3), BoId(4)]);
    assert!(ws.mem.is_none() && ws.front.is_none() && ws.back.is_none());
    assert!(ws.queue.is_empty());
}
