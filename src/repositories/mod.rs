pub mod blob;
pub mod draft;
pub mod folder;
pub mod memory;
pub mod mongo;
pub mod note;
pub mod personality;
pub mod user;

pub use blob::{BlobDeletion, BlobMetadata, BlobOutbox, BlobStore, GridFsBlobStore};
pub use draft::{
    Draft, DraftCreateRequest, DraftFilter, DraftListQuery, DraftRepository, DraftResponse,
    DraftType, DraftUpdateRequest,
};
pub use folder::{
    Folder, FolderCreateRequest, FolderDeletion, FolderRepository, FolderResponse,
    FolderUpdateRequest,
};
pub use memory::{MemoryBlobStore, MemoryStore};
pub use mongo::MongoStore;
pub use note::{
    Attachment, EnhancedVersion, Note, NoteFilter, NoteListQuery, NoteRepository, NoteResponse,
    NoteUpdateRequest,
};
pub use personality::{Personality, PersonalityRepository, PersonalityRequest, PersonalityResponse};
pub use user::{
    AccountDeleteRequest, IdentityLink, LoginRequest, PasswordChangeRequest, Preferences,
    PreferencesUpdateRequest, ProfileChanges, ProfileUpdateRequest, RegisterRequest, Theme, User,
    UserRepository, UserResponse,
};
