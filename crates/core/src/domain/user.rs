use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub rights: Option<UserRights>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRights {
    #[serde(default)]
    pub lead_add: Option<String>,
    #[serde(default)]
    pub lead_view: Option<String>,
    #[serde(default)]
    pub lead_edit: Option<String>,
}

impl User {
    pub fn can_add_leads(&self) -> bool {
        self.right(|rights| rights.lead_add.as_deref())
    }

    pub fn can_edit_leads(&self) -> bool {
        self.right(|rights| rights.lead_edit.as_deref())
    }

    fn right(&self, pick: impl Fn(&UserRights) -> Option<&str>) -> bool {
        self.rights.as_ref().and_then(pick) == Some("Y")
    }
}
