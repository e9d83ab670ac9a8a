// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Integer-addressed resource pools.

A [Registry] hands out IDs starting at 1 (0 is "no resource").  An entry moves through

```text
free -> in use -> pending release -> free
```

An entry in *pending release* is invisible to [Registry::get] but keeps its ID reserved until the
engine calls [Registry::free], which happens only once every frame that could still reference the
old resource has retired.  [Registry::generate] reuses the lowest free ID.
*/

#[derive(Debug)]
enum State<T> {
    Free,
    InUse(T),
    PendingRelease(T),
}

#[derive(Debug)]
pub(crate) struct Registry<T> {
    entries: Vec<State<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Registry {
            entries: Vec::new(),
        }
    }
}

const fn index(id: u32) -> Option<usize> {
    if id == 0 {
        None
    } else {
        Some(id as usize - 1)
    }
}

impl<T> Registry<T> {
    pub(crate) fn generate(&mut self, value: T) -> u32 {
        let slot = self
            .entries
            .iter()
            .position(|e| matches!(e, State::Free));
        let i = match slot {
            Some(i) => {
                self.entries[i] = State::InUse(value);
                i
            }
            None => {
                self.entries.push(State::InUse(value));
                self.entries.len() - 1
            }
        };
        i as u32 + 1
    }

    pub(crate) fn get(&self, id: u32) -> Option<&T> {
        match self.entries.get(index(id)?)? {
            State::InUse(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        match self.entries.get_mut(index(id)?)? {
            State::InUse(v) => Some(v),
            _ => None,
        }
    }

    /// Moves a live entry into pending release and returns it so its GPU objects can be queued.
    /// `None` when `id` is not live.
    pub(crate) fn mark_pending_release(&mut self, id: u32) -> Option<&mut T> {
        let entry = self.entries.get_mut(index(id)?)?;
        let State::InUse(_) = entry else {
            return None;
        };
        let State::InUse(value) = std::mem::replace(entry, State::Free) else {
            return None;
        };
        *entry = State::PendingRelease(value);
        match entry {
            State::PendingRelease(v) => Some(v),
            _ => None,
        }
    }

    /// Makes a pending-release ID available again.
    pub(crate) fn free(&mut self, id: u32) {
        if let Some(entry) = index(id).and_then(|i| self.entries.get_mut(i)) {
            if matches!(entry, State::PendingRelease(_)) {
                *entry = State::Free;
            } else {
                logwise::warn_sync!("Freeing resource {id} that was not pending release", id = id);
            }
        }
    }

    /// Live entries.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.entries.iter_mut().enumerate().filter_map(|(i, e)| match e {
            State::InUse(v) => Some((i as u32 + 1, v)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Registry;

    #[test]
    fn reuse_waits_for_free() {
        let mut r = Registry::default();
        assert_eq!(r.generate("a"), 1);
        assert_eq!(r.generate("b"), 2);
        assert!(r.mark_pending_release(1).is_some());
        assert!(r.get(1).is_none());
        assert!(r.mark_pending_release(1).is_none());
        assert_eq!(r.generate("c"), 3);
        r.free(1);
        assert_eq!(r.generate("d"), 1);
        assert_eq!(r.get(1), Some(&"d"));
        assert_eq!(r.iter_mut().count(), 3);
    }

    #[test]
    fn zero_is_never_valid() {
        let mut r: Registry<u8> = Registry::default();
        assert!(r.get(0).is_none());
        assert!(r.mark_pending_release(0).is_none());
        r.free(0);
    }
}
