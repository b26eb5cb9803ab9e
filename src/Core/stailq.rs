// Singly linked tail queue of messages. The link lives inside the message
// (`Cmsg::fifo`), so moving a batch between queues is two pointer stores.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::CBUS::Msg::Cmsg::Cmsg;

/// An intrusive FIFO of boxed messages.
///
/// The queue owns every message linked into it. `push_back` consumes the
/// `Box<Cmsg>` and `pop_front` hands it back, so a message is reachable
/// from exactly one queue (or from exactly one handler) at any time.
pub struct CmsgQueue {
    head: Option<NonNull<Cmsg>>,
    tail: Option<NonNull<Cmsg>>,
    len: usize,
    _owns: PhantomData<Box<Cmsg>>,
}

// The queue is the unique owner of the linked messages, which are Send.
unsafe impl Send for CmsgQueue {}

impl CmsgQueue {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            _owns: PhantomData,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Link a message at the tail.
    pub fn push_back(&mut self, msg: Box<Cmsg>) {
        debug_assert!(msg.fifo.is_none(), "message is already linked");
        let node = NonNull::from(Box::leak(msg));
        match self.tail {
            // Safety: `tail` points to a live message owned by this queue.
            Some(mut tail) => unsafe { tail.as_mut().fifo = Some(node) },
            None => self.head = Some(node),
        }
        self.tail = Some(node);
        self.len += 1;
    }

    /// Unlink the message at the head.
    pub fn pop_front(&mut self) -> Option<Box<Cmsg>> {
        let node = self.head?;
        // Safety: every node was produced by `Box::leak` in `push_back` and
        // is unlinked exactly once, here.
        let mut msg = unsafe { Box::from_raw(node.as_ptr()) };
        self.head = msg.fifo.take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(msg)
    }

    pub fn front(&self) -> Option<&Cmsg> {
        // Safety: the head is owned by the queue for as long as `self` is borrowed.
        self.head.map(|node| unsafe { &*node.as_ptr() })
    }

    /// Move every message of `other` to the tail of `self`, leaving `other`
    /// empty. Constant time regardless of the number of messages.
    pub fn append(&mut self, other: &mut CmsgQueue) {
        let Some(other_head) = other.head.take() else {
            return;
        };
        match self.tail {
            // Safety: see `push_back`.
            Some(mut tail) => unsafe { tail.as_mut().fifo = Some(other_head) },
            None => self.head = Some(other_head),
        }
        self.tail = other.tail.take();
        self.len += other.len;
        other.len = 0;
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head,
            _queue: PhantomData,
        }
    }
}

impl Default for CmsgQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CmsgQueue {
    fn drop(&mut self) {
        // Unlink one by one: dropping a long chain recursively would blow the stack.
        while self.pop_front().is_some() {}
    }
}

/// Borrowing iterator over a [`CmsgQueue`], head to tail.
pub struct Iter<'a> {
    next: Option<NonNull<Cmsg>>,
    _queue: PhantomData<&'a CmsgQueue>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Cmsg;

    fn next(&mut self) -> Option<&'a Cmsg> {
        let node = self.next?;
        // Safety: the queue is immutably borrowed for 'a, so no node is unlinked.
        let msg = unsafe { &*node.as_ptr() };
        self.next = msg.fifo;
        Some(msg)
    }
}
