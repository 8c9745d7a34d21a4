use std::collections::HashMap;

use parley_types::UserId;
use parley_types::models::UserJson;

/// Users seen as message senders, keyed by id.
#[derive(Debug, Default)]
pub struct UserStore {
    users: HashMap<UserId, UserJson>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the user, or refresh the stored record with newer data.
    pub fn get_or_create(&mut self, user_id: UserId, json: &UserJson) -> &UserJson {
        let user = self.users.entry(user_id).or_insert_with(|| json.clone());
        if user != json {
            *user = json.clone();
        }
        user
    }

    pub fn get(&self, user_id: UserId) -> Option<&UserJson> {
        self.users.get(&user_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
