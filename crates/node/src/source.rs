use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use postmesh_primitives::post::Post;

const TITLE_LEN: usize = 10;
const CONTENT_LEN: usize = 20;

/// Supplies the post published on each tick.
pub trait PostSource: Send {
    fn next_post(&mut self) -> Post;
}

impl<F> PostSource for F
where
    F: FnMut() -> Post + Send,
{
    fn next_post(&mut self) -> Post {
        self()
    }
}

/// Synthetic posts: a 3-digit user id, a 10-character title and 20
/// characters of content, all alphanumeric.
#[derive(Debug)]
pub struct RandomPosts<R = StdRng> {
    rng: R,
}

impl RandomPosts {
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for RandomPosts {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> RandomPosts<R> {
    pub const fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    fn alphanumeric(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }
}

impl<R: Rng + Send> PostSource for RandomPosts<R> {
    fn next_post(&mut self) -> Post {
        let user_id = format!("{:03}", self.rng.gen_range(0..1_000_u16));
        let title = self.alphanumeric(TITLE_LEN);
        let content = self.alphanumeric(CONTENT_LEN);

        Post::new(user_id, title, content)
    }
}
