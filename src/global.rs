use crate::config::Config;
use crate::job::JobRegistry;
use crate::search::SearchCache;

/// Everything a shell session keeps between input lines.
pub struct State {
	pub search_cache: SearchCache,
	pub jobs: JobRegistry,
	pub config: Config,
}

impl State {
	pub fn new(config: Config) -> State {
		State { search_cache: SearchCache::new(), jobs: JobRegistry::new(), config: config }
	}
}

impl Default for State {
	fn default() -> State {
		State::new(Config::default())
	}
}
