//! The fixed callback surface every component variant shares. Slots are bound
//! at construction time by probing the behavior definition; an unbound slot is
//! never invoked.

/// Lifecycle and contact callback slots, in invocation-relevant order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackSlot {
    Start,
    Update,
    LateUpdate,
    Destroy,
    CollisionEnter,
    CollisionExit,
    TriggerEnter,
    TriggerExit,
}

impl CallbackSlot {
    pub const ALL: [CallbackSlot; 8] = [
        CallbackSlot::Start,
        CallbackSlot::Update,
        CallbackSlot::LateUpdate,
        CallbackSlot::Destroy,
        CallbackSlot::CollisionEnter,
        CallbackSlot::CollisionExit,
        CallbackSlot::TriggerEnter,
        CallbackSlot::TriggerExit,
    ];

    /// The name probed on a behavior definition for this slot.
    pub const fn name(self) -> &'static str {
        match self {
            CallbackSlot::Start => "OnStart",
            CallbackSlot::Update => "OnUpdate",
            CallbackSlot::LateUpdate => "OnLateUpdate",
            CallbackSlot::Destroy => "OnDestroy",
            CallbackSlot::CollisionEnter => "OnCollisionEnter",
            CallbackSlot::CollisionExit => "OnCollisionExit",
            CallbackSlot::TriggerEnter => "OnTriggerEnter",
            CallbackSlot::TriggerExit => "OnTriggerExit",
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Bitflags recording which slots a component has bound, so dispatch can skip
/// components that do not implement a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotFlags(u8);

impl SlotFlags {
    pub const NONE: SlotFlags = SlotFlags(0);

    #[inline(always)]
    pub const fn new(bits: u8) -> Self {
        SlotFlags(bits)
    }

    #[inline(always)]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline(always)]
    pub const fn with(self, slot: CallbackSlot) -> Self {
        SlotFlags(self.0 | (1 << slot.index()))
    }

    #[inline(always)]
    pub const fn has(self, slot: CallbackSlot) -> bool {
        self.0 & (1 << slot.index()) != 0
    }
}
