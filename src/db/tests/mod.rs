mod files;
mod migrations;
