use std::iter::FromIterator;
use std::ops::{BitOr, BitOrAssign};




/// A dependency token: the set of tasks that must have completed before a
/// task holding this token as its prerequisite may run. Tokens combine with
/// `|`, which is a set union, so the combined token is satisfied only when
/// every contributing task is. The empty token ([`TaskID::none`]) is always
/// satisfied.
///
/// Tasks are numbered densely within one registry (a task list, or every
/// list of a collection), so the set is kept as a bit vector and testing
/// satisfaction costs one pass over a few words.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TaskID {
    words: Vec<u64>,
}

impl TaskID {
    /// The always-satisfied token.
    pub fn none() -> Self {
        Self::default()
    }

    pub(crate) fn single(number: usize) -> Self {
        let mut words = vec![0; number / 64 + 1];
        words[number / 64] = 1 << (number % 64);
        Self { words }
    }

    pub fn is_none(&self) -> bool {
        self.words.is_empty()
    }

    /// Return true if every task in this token is also in `completed`.
    pub fn is_satisfied_by(&self, completed: &TaskID) -> bool {
        self.words.iter().enumerate().all(|(n, w)| {
            let c = completed.words.get(n).copied().unwrap_or(0);
            w & !c == 0
        })
    }

    /// Return the largest task number in this token.
    pub fn highest(&self) -> Option<usize> {
        self.words.last().map(|w| (self.words.len() - 1) * 64 + 63 - w.leading_zeros() as usize)
    }

    /// Iterate over the task numbers in this token, in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(n, &w)| {
            (0..64).filter(move |b| w & (1 << b) != 0).map(move |b| n * 64 + b)
        })
    }

    pub(crate) fn insert(&mut self, other: &TaskID) {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    pub(crate) fn remove(&mut self, other: &TaskID) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !b;
        }
        self.trim();
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl BitOr for TaskID {
    type Output = TaskID;

    fn bitor(mut self, rhs: TaskID) -> TaskID {
        self.insert(&rhs);
        self
    }
}

impl<'a> BitOr<&'a TaskID> for &'a TaskID {
    type Output = TaskID;

    fn bitor(self, rhs: &'a TaskID) -> TaskID {
        let mut out = self.clone();
        out.insert(rhs);
        out
    }
}

impl BitOrAssign for TaskID {
    fn bitor_assign(&mut self, rhs: TaskID) {
        self.insert(&rhs)
    }
}

impl FromIterator<TaskID> for TaskID {
    fn from_iter<I: IntoIterator<Item = TaskID>>(iter: I) -> Self {
        iter.into_iter().fold(TaskID::none(), |a, b| a | b)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::TaskID;

    #[test]
    fn none_is_always_satisfied() {
        assert!(TaskID::none().is_satisfied_by(&TaskID::none()));
        assert!(TaskID::none().is_none());
    }

    #[test]
    fn combined_token_needs_both() {
        let a = TaskID::single(3);
        let b = TaskID::single(70);
        let ab = &a | &b;
        assert!(!ab.is_satisfied_by(&a));
        assert!(!ab.is_satisfied_by(&b));
        assert!(ab.is_satisfied_by(&(b.clone() | a.clone())));
        assert_eq!(ab, b | a);
        assert_eq!(ab.highest(), Some(70));
        assert_eq!(ab.iter().collect::<Vec<_>>(), vec![3, 70]);
    }

    #[test]
    fn remove_restores_structural_equality() {
        let mut a = TaskID::single(1) | TaskID::single(130);
        a.remove(&TaskID::single(130));
        assert_eq!(a, TaskID::single(1));
        a.remove(&TaskID::single(1));
        assert!(a.is_none());
    }
}
