use std::future::Future;

/// A value shown to the user that can run ahead of the server.
///
/// An update is two-phase: `begin` swaps in a projection and hands back a
/// token holding the last confirmed value; `confirm` or `rollback` consume
/// that token. A rollback always restores the captured snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimistic<T> {
    value: T,
}

/// Snapshot captured by `Optimistic::begin`.
#[must_use = "a pending update must be confirmed or rolled back"]
#[derive(Debug)]
pub struct Pending<T> {
    snapshot: T,
}

impl<T> Pending<T> {
    pub fn snapshot(&self) -> &T {
        &self.snapshot
    }
}

impl<T: Clone> Optimistic<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replaces the value outside of any pending update.
    pub fn set(&mut self, value: T) {
        self.value = value;
    }

    pub fn begin(&mut self, projection: T) -> Pending<T> {
        let snapshot = std::mem::replace(&mut self.value, projection);
        Pending { snapshot }
    }

    pub fn confirm(&mut self, pending: Pending<T>, confirmed: T) {
        drop(pending);
        self.value = confirmed;
    }

    pub fn rollback(&mut self, pending: Pending<T>) {
        self.value = pending.snapshot;
    }

    /// Runs one full optimistic update: project, call `remote`, then confirm
    /// with its result or roll back on error.
    pub async fn apply<R, E, Fut>(
        &mut self,
        project: impl FnOnce(&T) -> T,
        remote: Fut,
        confirm: impl FnOnce(&R) -> T,
    ) -> Result<R, E>
    where
        Fut: Future<Output = Result<R, E>>,
    {
        let projection = project(&self.value);
        let pending = self.begin(projection);
        match remote.await {
            Ok(result) => {
                self.confirm(pending, confirm(&result));
                Ok(result)
            }
            Err(e) => {
                self.rollback(pending);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Star {
        starred: bool,
        stars: i64,
    }

    fn toggled(s: &Star) -> Star {
        Star {
            starred: !s.starred,
            stars: if s.starred { s.stars - 1 } else { s.stars + 1 },
        }
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let mut star = Optimistic::new(Star {
            starred: false,
            stars: 41,
        });

        let result: Result<(), &str> = star
            .apply(toggled, async { Err("offline") }, |_| unreachable!())
            .await;

        assert!(result.is_err());
        assert_eq!(
            *star.get(),
            Star {
                starred: false,
                stars: 41
            }
        );
    }

    #[tokio::test]
    async fn test_confirm_uses_server_value() {
        let mut star = Optimistic::new(Star {
            starred: false,
            stars: 41,
        });

        let server = Star {
            starred: true,
            stars: 50,
        };
        let result: Result<Star, ()> = star.apply(toggled, async move { Ok(server) }, |s| *s).await;

        assert!(result.is_ok());
        assert_eq!(*star.get(), server);
    }

    #[test]
    fn test_projection_visible_while_pending() {
        let mut star = Optimistic::new(Star {
            starred: false,
            stars: 1,
        });
        let pending = star.begin(toggled(star.get()));
        assert_eq!(star.get().stars, 2);
        assert_eq!(pending.snapshot().stars, 1);

        // A later unrelated write does not change what rollback restores.
        star.set(Star {
            starred: true,
            stars: 99,
        });
        star.rollback(pending);
        assert_eq!(star.get().stars, 1);
    }
}
