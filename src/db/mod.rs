pub mod dbsnapshot;
