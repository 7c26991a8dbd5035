use std::collections::VecDeque;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("stack underflow")]
    Underflow,
}

/// Backing sequence for a [`Stack`]. Only the back end is ever touched.
pub trait StackStorage<T>: Default {
    fn push_back(&mut self, value: T);
    fn pop_back(&mut self) -> Option<T>;
    fn back(&self) -> Option<&T>;
    fn back_mut(&mut self) -> Option<&mut T>;
    fn len(&self) -> usize;
    fn clear(&mut self);

    /// Elements from bottom to top.
    fn iter<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a T>
    where
        T: 'a;
}

impl<T> StackStorage<T> for Vec<T> {
    fn push_back(&mut self, value: T) {
        self.push(value);
    }

    fn pop_back(&mut self) -> Option<T> {
        self.pop()
    }

    fn back(&self) -> Option<&T> {
        self.last()
    }

    fn back_mut(&mut self) -> Option<&mut T> {
        self.last_mut()
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn iter<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a T>
    where
        T: 'a,
    {
        self.as_slice().iter()
    }
}

impl<T> StackStorage<T> for VecDeque<T> {
    fn push_back(&mut self, value: T) {
        VecDeque::push_back(self, value);
    }

    fn pop_back(&mut self) -> Option<T> {
        VecDeque::pop_back(self)
    }

    fn back(&self) -> Option<&T> {
        VecDeque::back(self)
    }

    fn back_mut(&mut self) -> Option<&mut T> {
        VecDeque::back_mut(self)
    }

    fn len(&self) -> usize {
        VecDeque::len(self)
    }

    fn clear(&mut self) {
        VecDeque::clear(self);
    }

    fn iter<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a T>
    where
        T: 'a,
    {
        VecDeque::iter(self)
    }
}

/// LIFO adaptor over a sequence.
///
/// Every access to the top is checked: on an empty stack `top`, `top_mut`,
/// `pop` and `pop_guard` return [`StackError::Underflow`] instead of
/// panicking, so an executor can surface a malformed program as an error.
#[derive(Debug, Clone)]
pub struct Stack<T, S = Vec<T>> {
    items: S,
    _marker: PhantomData<T>,
}

/// Stack over a contiguous growable array.
pub type VecStack<T> = Stack<T, Vec<T>>;

/// Stack over a double-ended queue.
pub type DequeStack<T> = Stack<T, VecDeque<T>>;

impl<T, S: StackStorage<T>> Default for Stack<T, S> {
    fn default() -> Self {
        Self {
            items: S::default(),
            _marker: PhantomData,
        }
    }
}

impl<T, S: StackStorage<T>> Stack<T, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: T) {
        self.items.push_back(value);
    }

    pub fn top(&self) -> Result<&T, StackError> {
        self.items.back().ok_or(StackError::Underflow)
    }

    pub fn top_mut(&mut self) -> Result<&mut T, StackError> {
        self.items.back_mut().ok_or(StackError::Underflow)
    }

    pub fn pop(&mut self) -> Result<T, StackError> {
        self.items.pop_back().ok_or(StackError::Underflow)
    }

    /// Borrow the top element and pop it when the guard goes out of scope.
    ///
    /// The pop happens exactly once however the scope is left: normal end,
    /// early `return`, `?` propagation or unwinding.
    ///
    /// ```
    /// use bls_bytecode::util::stack::VecStack;
    ///
    /// let mut stack = VecStack::new();
    /// stack.push(41);
    /// {
    ///     let mut top = stack.pop_guard().unwrap();
    ///     *top += 1;
    ///     assert_eq!(*top, 42);
    /// }
    /// assert!(stack.is_empty());
    /// ```
    pub fn pop_guard(&mut self) -> Result<PopGuard<'_, T, S>, StackError> {
        if self.items.back().is_none() {
            return Err(StackError::Underflow);
        }
        Ok(PopGuard {
            stack: self,
            armed: true,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.len() == 0
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Elements from bottom to top.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }
}

/// Scoped access to the top of a [`Stack`]; see [`Stack::pop_guard`].
pub struct PopGuard<'a, T, S: StackStorage<T>> {
    stack: &'a mut Stack<T, S>,
    armed: bool,
}

impl<T, S: StackStorage<T>> PopGuard<'_, T, S> {
    /// Pop now and hand the value out instead of dropping it.
    pub fn take(mut self) -> T {
        self.armed = false;
        match self.stack.items.pop_back() {
            Some(value) => value,
            None => unreachable!("pop guard created on an empty stack"),
        }
    }
}

impl<T, S: StackStorage<T>> Deref for PopGuard<'_, T, S> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.stack.items.back() {
            Some(value) => value,
            None => unreachable!("pop guard created on an empty stack"),
        }
    }
}

impl<T, S: StackStorage<T>> DerefMut for PopGuard<'_, T, S> {
    fn deref_mut(&mut self) -> &mut T {
        match self.stack.items.back_mut() {
            Some(value) => value,
            None => unreachable!("pop guard created on an empty stack"),
        }
    }
}

impl<T, S: StackStorage<T>> Drop for PopGuard<'_, T, S> {
    fn drop(&mut self) {
        if self.armed {
            self.stack.items.pop_back();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, PartialEq)]
    enum Failure {
        Odd(i32),
    }

    fn consume_even(stack: &mut DequeStack<i32>) -> Result<i32, Failure> {
        let top = stack.pop_guard().map_err(|_| Failure::Odd(-1))?;
        if *top % 2 != 0 {
            return Err(Failure::Odd(*top));
        }
        Ok(*top / 2)
    }

    #[test]
    fn test_push_top_pop() {
        let mut stack = VecStack::new();
        stack.push(1);
        stack.push(2);
        assert_eq!(stack.top(), Ok(&2));
        *stack.top_mut().unwrap() = 5;
        assert_eq!(stack.pop(), Ok(5));
        assert_eq!(stack.pop(), Ok(1));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_empty_stack_is_checked() {
        let mut stack: DequeStack<String> = DequeStack::new();
        assert_eq!(stack.top(), Err(StackError::Underflow));
        assert_eq!(stack.top_mut().err(), Some(StackError::Underflow));
        assert_eq!(stack.pop(), Err(StackError::Underflow));
        assert!(matches!(stack.pop_guard(), Err(StackError::Underflow)));
    }

    #[test]
    fn test_guard_pops_on_normal_exit() {
        let mut stack = VecStack::new();
        stack.push("a".to_string());
        stack.push("b".to_string());
        {
            let mut top = stack.pop_guard().unwrap();
            top.push('!');
            assert_eq!(top.as_str(), "b!");
        }
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.top().unwrap(), "a");
    }

    #[test]
    fn test_guard_pops_on_early_return() {
        let mut stack = DequeStack::new();
        stack.push(4);
        stack.push(3);

        assert_eq!(consume_even(&mut stack), Err(Failure::Odd(3)));
        assert_eq!(stack.len(), 1);

        assert_eq!(consume_even(&mut stack), Ok(2));
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn test_guard_pops_on_unwind() {
        let mut stack = VecStack::new();
        stack.push(1);
        stack.push(2);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _top = stack.pop_guard().unwrap();
            panic!("executor failed mid-instruction");
        }));

        assert!(result.is_err());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_guard_take_pops_once() {
        let mut stack = VecStack::new();
        stack.push(10);
        stack.push(20);
        let value = stack.pop_guard().unwrap().take();
        assert_eq!(value, 20);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.top(), Ok(&10));
    }

    #[test]
    fn test_guard_count_invariant() {
        let mut stack = DequeStack::new();
        for i in 0..8 {
            stack.push(i);
        }
        for expected_len in (0..8).rev() {
            let before = stack.len();
            {
                let _guard = stack.pop_guard().unwrap();
            }
            assert_eq!(stack.len(), before - 1);
            assert_eq!(stack.len(), expected_len);
        }
    }

    #[test]
    fn test_iter_bottom_to_top() {
        let mut stack = VecStack::new();
        stack.push('x');
        stack.push('y');
        let items: Vec<_> = stack.iter().copied().collect();
        assert_eq!(items, vec!['x', 'y']);
        let reversed: Vec<_> = stack.iter().rev().copied().collect();
        assert_eq!(reversed, vec!['y', 'x']);
    }
}
