pub mod ids;

pub use ids::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_id_nil() {
        let nil = ActorId::nil();
        assert!(nil.is_nil());
        assert_eq!(nil.as_u64(), 0);
        assert_eq!(ActorId::default(), nil);
    }

    #[test]
    fn actor_id_roundtrip_u64() {
        for value in [1u64, 2, 7, 12345, u64::MAX] {
            let id = ActorId::from_u64(value);
            assert_eq!(ActorId::from_u64(id.as_u64()), id);
            assert!(!id.is_nil());
        }
    }

    #[test]
    fn actor_id_ordering_follows_value() {
        assert!(ActorId(1) < ActorId(2));
        assert!(ActorId(100) > ActorId(99));
    }

    #[test]
    fn allocator_is_monotonic() {
        let mut alloc = ActorIdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        let c = alloc.next();
        assert_eq!(a, ActorId(1));
        assert_eq!(b, ActorId(2));
        assert_eq!(c, ActorId(3));
    }

    #[test]
    fn allocator_observe_raises_past_loaded_ids() {
        let mut alloc = ActorIdAllocator::new();
        alloc.next();
        alloc.observe(ActorId(40));
        assert_eq!(alloc.next(), ActorId(41));

        // Observing a lower id never rolls the counter back.
        alloc.observe(ActorId(5));
        assert_eq!(alloc.next(), ActorId(42));
    }

    #[test]
    fn allocator_reset() {
        let mut alloc = ActorIdAllocator::new();
        alloc.next();
        alloc.next();
        alloc.reset();
        assert_eq!(alloc.next(), ActorId(1));
    }
}
